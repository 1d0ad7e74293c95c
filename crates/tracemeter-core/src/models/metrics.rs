//! Metrics data models

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Largest cost a single bucket may report.
///
/// Sums of bounded records stay far below `Decimal::MAX`.
pub const MAX_RECORD_COST: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0); // 1_000_000_000_000_000

/// One reporting bucket as returned by the metrics API
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Time bucket identifier (usually a date)
    #[serde(default, alias = "date", alias = "timestamp")]
    pub bucket: String,

    /// Number of traces in the bucket
    #[serde(
        default,
        alias = "traceCount",
        alias = "countTraces",
        deserialize_with = "deserialize_count"
    )]
    pub trace_count: u64,

    /// Total cost in currency units
    #[serde(
        default,
        alias = "totalCost",
        deserialize_with = "deserialize_decimal"
    )]
    pub total_cost: Decimal,

    /// Total tokens (input + output)
    #[serde(default, alias = "totalTokens", deserialize_with = "deserialize_count")]
    pub total_tokens: u64,

    /// Number of failed traces
    #[serde(default, alias = "errorCount", deserialize_with = "deserialize_count")]
    pub error_count: u64,

    /// Latency in milliseconds
    #[serde(default)]
    pub latency: Option<f64>,

    /// Model name
    #[serde(default)]
    pub model: Option<String>,

    /// User the bucket belongs to
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,

    /// Tags attached to the traces of the bucket
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeSet<String>,

    /// Mean evaluation score in [0, 1]
    #[serde(default, alias = "qualityScore")]
    pub quality_score: Option<f64>,
}

impl MetricRecord {
    /// Check the record invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.error_count > self.trace_count {
            return Err(format!(
                "bucket '{}': error_count {} exceeds trace_count {}",
                self.bucket, self.error_count, self.trace_count
            ));
        }
        if self.total_cost.is_sign_negative() && !self.total_cost.is_zero() {
            return Err(format!(
                "bucket '{}': negative total_cost {}",
                self.bucket, self.total_cost
            ));
        }
        if self.total_cost > MAX_RECORD_COST {
            return Err(format!(
                "bucket '{}': total_cost {} exceeds {MAX_RECORD_COST}",
                self.bucket, self.total_cost
            ));
        }
        if let Some(latency) = self.latency {
            if !latency.is_finite() || latency < 0.0 {
                return Err(format!("bucket '{}': invalid latency {latency}", self.bucket));
            }
        }
        if let Some(score) = self.quality_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(format!(
                    "bucket '{}': quality_score {score} outside [0, 1]",
                    self.bucket
                ));
            }
        }
        Ok(())
    }
}

/// Dimension a cost breakdown is grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Model name
    Model,
    /// User id
    User,
    /// Trace tag
    Tag,
}

impl Dimension {
    /// Display label
    pub fn label(self) -> &'static str {
        match self {
            Self::Model => "Model",
            Self::User => "User",
            Self::Tag => "Tag",
        }
    }
}

/// Aggregate over a sequence of [`MetricRecord`]s
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Summary {
    /// Number of records folded into this summary
    pub records: usize,

    /// Total traces
    pub total_traces: u64,

    /// Total cost
    pub total_cost: Decimal,

    /// Total tokens
    pub total_tokens: u64,

    /// Total errors
    pub total_errors: u64,

    /// `total_errors / total_traces`, 0 when there are no traces
    pub error_rate: f64,

    /// Latencies in arrival order (ms)
    pub latencies: Vec<f64>,

    /// Quality scores in arrival order
    pub quality_scores: Vec<f64>,

    /// Distinct models seen
    pub models: BTreeSet<String>,

    /// Distinct users seen
    pub users: BTreeSet<String>,

    /// Accumulated cost per model
    pub cost_by_model: BTreeMap<String, Decimal>,

    /// Accumulated cost per user
    pub cost_by_user: BTreeMap<String, Decimal>,

    /// Accumulated cost per tag
    pub cost_by_tag: BTreeMap<String, Decimal>,
}

impl Summary {
    /// Nearest-rank percentile of the recorded latencies.
    ///
    /// The latencies are sorted ascending and the value at
    /// `floor(p * count)` is returned, without interpolation.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        nearest_rank(&self.latencies, p)
    }

    /// 95th percentile latency, `None` when no latency was recorded
    pub fn latency_p95(&self) -> Option<f64> {
        self.percentile(0.95)
    }

    /// Mean latency
    pub fn avg_latency(&self) -> Option<f64> {
        mean(&self.latencies)
    }

    /// Mean quality score
    pub fn avg_quality_score(&self) -> Option<f64> {
        mean(&self.quality_scores)
    }

    /// Average cost per trace
    pub fn cost_per_trace(&self) -> Option<Decimal> {
        (self.total_traces > 0).then(|| self.total_cost / Decimal::from(self.total_traces))
    }

    /// Average tokens per trace (integer division)
    pub fn tokens_per_trace(&self) -> Option<u64> {
        (self.total_traces > 0).then(|| self.total_tokens / self.total_traces)
    }

    /// Per-dimension cost map
    pub fn costs(&self, dimension: Dimension) -> &BTreeMap<String, Decimal> {
        match dimension {
            Dimension::Model => &self.cost_by_model,
            Dimension::User => &self.cost_by_user,
            Dimension::Tag => &self.cost_by_tag,
        }
    }

    /// Cost breakdown by `dimension`, most expensive first
    pub fn breakdown(&self, dimension: Dimension) -> CostBreakdown {
        let mut breakdown: Vec<CostBreakdownItem> = self
            .costs(dimension)
            .iter()
            .map(|(key, cost)| CostBreakdownItem {
                key: key.clone(),
                cost: *cost,
                percentage: percentage_of(*cost, self.total_cost),
            })
            .collect();

        breakdown.sort_by(|a, b| b.cost.cmp(&a.cost).then_with(|| a.key.cmp(&b.key)));

        CostBreakdown {
            dimension,
            total_cost: self.total_cost,
            breakdown,
        }
    }
}

/// Cost breakdown by dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdown {
    /// The grouped dimension
    pub dimension: Dimension,

    /// Total cost
    pub total_cost: Decimal,

    /// Cost breakdown by the grouped dimension
    pub breakdown: Vec<CostBreakdownItem>,
}

/// Individual item in a cost breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostBreakdownItem {
    /// The key (model name, user id or tag)
    pub key: String,

    /// Cost for this item
    pub cost: Decimal,

    /// Percentage of total
    pub percentage: f64,
}

fn nearest_rank(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let index = (p * sorted.len() as f64).floor() as usize;

    Some(sorted[index.min(sorted.len() - 1)])
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn percentage_of(part: Decimal, total: Decimal) -> f64 {
    if total.is_zero() {
        return 0.0;
    }
    part.checked_div(total)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|pct| pct.to_f64())
        .unwrap_or(0.0)
}

/// Parse a decimal from a JSON number or string without a binary float round trip
fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|e| format!("invalid decimal '{raw}': {e}"))
}

fn decimal_from_value(value: serde_json::Value) -> Result<Option<Decimal>, String> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(n) => parse_decimal(&n.to_string()).map(Some),
        serde_json::Value::String(s) => parse_decimal(&s).map(Some),
        other => Err(format!("expected a number, got {other}")),
    }
}

pub(crate) fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    decimal_from_value(value)
        .map(Option::unwrap_or_default)
        .map_err(serde::de::Error::custom)
}

pub(crate) fn deserialize_optional_decimal<'de, D>(
    deserializer: D,
) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    decimal_from_value(value).map_err(serde::de::Error::custom)
}

fn deserialize_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<String>>::deserialize(deserializer)?.unwrap_or_default())
}
