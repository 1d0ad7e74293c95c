//! Threshold evaluation

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Alert, AlertKind, AlertThresholds, Summary};
use crate::report::format_cost;

/// Checks a [`Summary`] against configured [`AlertThresholds`].
///
/// Checks run in a fixed order: error rate, cost, latency, quality. Each
/// call is independent; nothing is remembered between evaluations.
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    thresholds: AlertThresholds,
}

impl AlertEvaluator {
    /// Create a new alert evaluator
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self { thresholds }
    }

    /// The configured thresholds
    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    /// Evaluate all configured checks
    pub fn evaluate(&self, summary: &Summary) -> Vec<Alert> {
        let alerts: Vec<Alert> = [
            self.check_error_rate(summary),
            self.check_cost(summary),
            self.check_latency(summary),
            self.check_quality(summary),
        ]
        .into_iter()
        .flatten()
        .collect();

        debug!(alerts = alerts.len(), "Evaluated thresholds");
        alerts
    }

    fn check_error_rate(&self, summary: &Summary) -> Option<Alert> {
        let threshold = self.thresholds.error_rate?;
        let observed = summary.error_rate;

        (observed > threshold).then(|| Alert {
            kind: AlertKind::ErrorRate,
            observed,
            threshold,
            message: format!(
                "HIGH ERROR RATE: {:.2}% (threshold: {}%)",
                observed * 100.0,
                trim_float(threshold * 100.0)
            ),
        })
    }

    fn check_cost(&self, summary: &Summary) -> Option<Alert> {
        let threshold = self.thresholds.daily_cost?;
        let observed = summary.total_cost;

        (observed > threshold).then(|| Alert {
            kind: AlertKind::Cost,
            observed: to_f64(observed),
            threshold: to_f64(threshold),
            message: format!(
                "HIGH DAILY COST: ${} (threshold: ${})",
                format_cost(observed, 2),
                threshold.normalize()
            ),
        })
    }

    fn check_latency(&self, summary: &Summary) -> Option<Alert> {
        let threshold = self.thresholds.latency_p95?;
        let observed = summary.latency_p95()?;

        (observed > threshold).then(|| Alert {
            kind: AlertKind::Latency,
            observed,
            threshold,
            message: format!(
                "HIGH LATENCY (P95): {observed:.0}ms (threshold: {}ms)",
                trim_float(threshold)
            ),
        })
    }

    /// Quality is a floor: it fires when the mean score drops below it
    fn check_quality(&self, summary: &Summary) -> Option<Alert> {
        let threshold = self.thresholds.quality_score?;
        let observed = summary.avg_quality_score()?;

        (observed < threshold).then(|| Alert {
            kind: AlertKind::Quality,
            observed,
            threshold,
            message: format!("LOW QUALITY SCORE: {observed:.2} (threshold: {threshold:.2})"),
        })
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::MAX)
}

/// Format a threshold without trailing zeros
fn trim_float(value: f64) -> String {
    let formatted = format!("{value:.4}");
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
