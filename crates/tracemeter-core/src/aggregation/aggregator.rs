//! Single-pass reduction of metric records

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{MetricRecord, Summary};

/// Folds [`MetricRecord`]s into a [`Summary`].
///
/// Memory beyond the dimension maps and the latency/score lists is constant,
/// so records can be pushed straight from a stream.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    summary: Summary,
}

impl MetricsAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate a complete sequence of records
    pub fn aggregate<'a, I>(records: I) -> Summary
    where
        I: IntoIterator<Item = &'a MetricRecord>,
    {
        let mut aggregator = Self::new();
        for record in records {
            aggregator.push(record);
        }
        aggregator.finish()
    }

    /// Fold one record into the running totals
    pub fn push(&mut self, record: &MetricRecord) {
        let summary = &mut self.summary;

        summary.records += 1;
        summary.total_traces = summary.total_traces.saturating_add(record.trace_count);
        summary.total_cost = add_saturating(summary.total_cost, record.total_cost);
        summary.total_tokens = summary.total_tokens.saturating_add(record.total_tokens);
        summary.total_errors = summary.total_errors.saturating_add(record.error_count);

        if let Some(latency) = record.latency {
            summary.latencies.push(latency);
        }
        if let Some(score) = record.quality_score {
            summary.quality_scores.push(score);
        }

        if let Some(model) = &record.model {
            summary.models.insert(model.clone());
            add_cost(&mut summary.cost_by_model, model, record.total_cost);
        }
        if let Some(user) = &record.user_id {
            summary.users.insert(user.clone());
            add_cost(&mut summary.cost_by_user, user, record.total_cost);
        }
        for tag in &record.tags {
            add_cost(&mut summary.cost_by_tag, tag, record.total_cost);
        }
    }

    /// Number of records pushed so far
    pub fn len(&self) -> usize {
        self.summary.records
    }

    /// Whether no record was pushed
    pub fn is_empty(&self) -> bool {
        self.summary.records == 0
    }

    /// Finish the pass and compute the error rate
    #[allow(clippy::cast_precision_loss)]
    pub fn finish(self) -> Summary {
        let mut summary = self.summary;

        if summary.total_traces > 0 {
            summary.error_rate = summary.total_errors as f64 / summary.total_traces as f64;
        }

        if summary.total_errors > summary.total_traces {
            warn!(
                errors = summary.total_errors,
                traces = summary.total_traces,
                "More errors than traces in aggregated records"
            );
        }

        summary
    }
}

/// Sums past the decimal range stick at the bound instead of panicking
fn add_saturating(total: Decimal, cost: Decimal) -> Decimal {
    total.checked_add(cost).unwrap_or_else(|| {
        warn!(%total, %cost, "Cost sum exceeds the decimal range, clamping");
        if cost.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        }
    })
}

fn add_cost(costs: &mut BTreeMap<String, Decimal>, key: &str, cost: Decimal) {
    match costs.get_mut(key) {
        Some(total) => *total = add_saturating(*total, cost),
        None => {
            costs.insert(key.to_string(), cost);
        }
    }
}

/// Result of folding a fetch stream
#[derive(Debug)]
pub struct AggregateOutcome {
    /// Summary of every record received before the stream ended
    pub summary: Summary,

    /// The error that ended the stream early, if any
    pub error: Option<Error>,
}

impl AggregateOutcome {
    /// Whether the stream ended without error
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The summary, or the error that interrupted the fetch
    pub fn into_result(self) -> Result<Summary> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.summary),
        }
    }
}

/// Fold a record stream, keeping the partial summary if the stream fails
pub async fn aggregate_stream<S>(stream: S) -> AggregateOutcome
where
    S: Stream<Item = Result<MetricRecord>>,
{
    futures::pin_mut!(stream);

    let mut aggregator = MetricsAggregator::new();
    let mut error = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => aggregator.push(&record),
            Err(e) => {
                warn!(records = aggregator.len(), error = %e, "Fetch failed, keeping partial summary");
                error = Some(e);
                break;
            }
        }
    }

    let summary = aggregator.finish();
    debug!(
        records = summary.records,
        traces = summary.total_traces,
        complete = error.is_none(),
        "Aggregation finished"
    );

    AggregateOutcome { summary, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::Dimension;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn record(traces: u64, cost_cents: i64, errors: u64) -> MetricRecord {
        MetricRecord {
            trace_count: traces,
            total_cost: Decimal::new(cost_cents, 2),
            error_count: errors,
            ..MetricRecord::default()
        }
    }

    #[test]
    fn test_three_bucket_scenario() {
        let records = vec![record(10, 500, 1), record(5, 250, 0), record(0, 0, 0)];

        let summary = MetricsAggregator::aggregate(&records);

        assert_eq!(summary.records, 3);
        assert_eq!(summary.total_traces, 15);
        assert_eq!(summary.total_cost, Decimal::new(750, 2));
        assert_eq!(summary.total_errors, 1);
        assert!((summary.error_rate - 1.0 / 15.0).abs() < f64::EPSILON);
        assert!((summary.error_rate - 0.0667).abs() < 0.0001);
    }

    #[test]
    fn test_empty_input() {
        let summary = MetricsAggregator::aggregate(std::iter::empty());

        assert_eq!(summary.total_traces, 0);
        assert_eq!(summary.error_rate, 0.0);
        assert_eq!(summary.latency_p95(), None);
        assert_eq!(summary.avg_quality_score(), None);
    }

    #[test]
    fn test_missing_fields_do_not_contribute() {
        let records = vec![
            MetricRecord {
                trace_count: 3,
                total_cost: Decimal::new(300, 2),
                latency: Some(120.0),
                model: Some("gpt-4o".into()),
                user_id: Some("alice".into()),
                tags: ["prod".to_string(), "chat".to_string()].into(),
                ..MetricRecord::default()
            },
            MetricRecord {
                trace_count: 1,
                total_cost: Decimal::new(100, 2),
                ..MetricRecord::default()
            },
        ];

        let summary = MetricsAggregator::aggregate(&records);

        assert_eq!(summary.total_cost, Decimal::new(400, 2));
        assert_eq!(summary.latencies, vec![120.0]);
        assert_eq!(summary.models.len(), 1);
        assert_eq!(summary.users.len(), 1);
        assert_eq!(summary.cost_by_model["gpt-4o"], Decimal::new(300, 2));
        assert_eq!(summary.cost_by_user["alice"], Decimal::new(300, 2));
        assert_eq!(summary.cost_by_tag["prod"], Decimal::new(300, 2));
        assert_eq!(summary.cost_by_tag["chat"], Decimal::new(300, 2));
        assert_eq!(summary.breakdown(Dimension::Model).breakdown.len(), 1);
    }

    #[test]
    fn test_costs_accumulate_per_dimension() {
        let make = |model: &str, user: &str, cents: i64| MetricRecord {
            trace_count: 1,
            total_cost: Decimal::new(cents, 2),
            model: Some(model.into()),
            user_id: Some(user.into()),
            ..MetricRecord::default()
        };
        let records = vec![
            make("gpt-4o", "alice", 125),
            make("gpt-4o-mini", "alice", 10),
            make("gpt-4o", "bob", 75),
        ];

        let summary = MetricsAggregator::aggregate(&records);

        assert_eq!(summary.cost_by_model["gpt-4o"], Decimal::new(200, 2));
        assert_eq!(summary.cost_by_model["gpt-4o-mini"], Decimal::new(10, 2));
        assert_eq!(summary.cost_by_user["alice"], Decimal::new(135, 2));
        assert_eq!(summary.cost_by_user["bob"], Decimal::new(75, 2));
        assert_eq!(
            summary.users.iter().cloned().collect::<Vec<_>>(),
            vec!["alice".to_string(), "bob".to_string()]
        );
    }

    #[test]
    fn test_many_small_costs_do_not_drift() {
        let records: Vec<_> = (0..10_000)
            .map(|_| MetricRecord {
                total_cost: Decimal::new(1, 4),
                ..MetricRecord::default()
            })
            .collect();

        let summary = MetricsAggregator::aggregate(&records);

        assert_eq!(summary.total_cost, Decimal::ONE);
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let records = vec![
            MetricRecord {
                trace_count: 7,
                total_cost: Decimal::new(1234, 3),
                error_count: 2,
                latency: Some(250.5),
                model: Some("gpt-4o".into()),
                tags: ["b".to_string(), "a".to_string()].into(),
                quality_score: Some(0.8),
                ..MetricRecord::default()
            },
            record(3, 99, 1),
        ];

        assert_eq!(
            MetricsAggregator::aggregate(&records),
            MetricsAggregator::aggregate(&records)
        );
    }

    #[test]
    fn test_cost_sum_clamps_at_decimal_max() {
        let half = Decimal::MAX / Decimal::TWO;
        let records: Vec<_> = (0..3)
            .map(|_| MetricRecord {
                trace_count: u64::MAX,
                total_cost: half,
                model: Some("gpt-4o".into()),
                tags: ["prod".to_string()].into(),
                ..MetricRecord::default()
            })
            .collect();

        let summary = MetricsAggregator::aggregate(&records);

        assert_eq!(summary.total_cost, Decimal::MAX);
        assert_eq!(summary.cost_by_model["gpt-4o"], Decimal::MAX);
        assert_eq!(summary.cost_by_tag["prod"], Decimal::MAX);
        assert_eq!(summary.total_traces, u64::MAX);
        assert!((summary.breakdown(Dimension::Model).breakdown[0].percentage - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stream_failure_keeps_partial_summary() {
        let items = vec![
            Ok(record(4, 200, 1)),
            Err(Error::Fetch {
                page: 2,
                cause: FetchError::Timeout,
            }),
            Ok(record(100, 100, 0)),
        ];

        let outcome = aggregate_stream(futures::stream::iter(items)).await;

        assert!(!outcome.is_complete());
        assert_eq!(outcome.summary.total_traces, 4);
        assert_eq!(outcome.summary.error_rate, 0.25);
        assert!(matches!(outcome.into_result(), Err(Error::Fetch { page: 2, .. })));
    }

    #[tokio::test]
    async fn test_stream_success() {
        let items = vec![Ok(record(10, 500, 1)), Ok(record(5, 250, 0))];

        let summary = aggregate_stream(futures::stream::iter(items))
            .await
            .into_result()
            .unwrap();

        assert_eq!(summary.total_traces, 15);
    }

    fn arb_record() -> impl Strategy<Value = MetricRecord> {
        (
            0u64..1_000,
            0i64..100_000,
            proptest::option::of(prop_oneof![Just("a"), Just("b"), Just("c")]),
            proptest::option::of(0.0f64..10_000.0),
        )
            .prop_flat_map(|(traces, cents, model, latency)| {
                (0..=traces).prop_map(move |errors| MetricRecord {
                    trace_count: traces,
                    error_count: errors,
                    total_cost: Decimal::new(cents, 2),
                    model: model.map(str::to_string),
                    latency,
                    ..MetricRecord::default()
                })
            })
    }

    proptest! {
        #[test]
        fn prop_summary_invariants(records in proptest::collection::vec(arb_record(), 0..40)) {
            let summary = MetricsAggregator::aggregate(&records);

            prop_assert!(summary.total_errors <= summary.total_traces);
            prop_assert!((0.0..=1.0).contains(&summary.error_rate));
            if summary.total_traces == 0 {
                prop_assert_eq!(summary.error_rate, 0.0);
            } else {
                #[allow(clippy::cast_precision_loss)]
                let expected = summary.total_errors as f64 / summary.total_traces as f64;
                prop_assert_eq!(summary.error_rate, expected);
            }

            let model_total: Decimal = summary.cost_by_model.values().copied().sum();
            prop_assert!(model_total <= summary.total_cost);
            prop_assert!(summary.cost_by_model.values().all(|c| !c.is_sign_negative()));
            prop_assert_eq!(summary.latencies.len(), records.iter().filter(|r| r.latency.is_some()).count());
        }
    }
}
