//! Alert data models

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::metrics::deserialize_optional_decimal;

/// Kind of triggered condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Error rate above threshold
    ErrorRate,
    /// Cost above budget
    Cost,
    /// P95 latency above threshold
    Latency,
    /// Mean quality score below floor
    Quality,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ErrorRate => "error_rate",
            Self::Cost => "cost",
            Self::Latency => "latency",
            Self::Quality => "quality",
        };
        f.write_str(name)
    }
}

/// A triggered alert condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Which check fired
    pub kind: AlertKind,

    /// The observed value
    pub observed: f64,

    /// The configured threshold
    pub threshold: f64,

    /// Human-readable message
    pub message: String,
}

/// Alert thresholds. An unset threshold disables its check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Maximum error rate as a fraction (0.05 = 5%)
    #[serde(default)]
    pub error_rate: Option<f64>,

    /// Maximum cost per day in currency units
    #[serde(default, deserialize_with = "deserialize_optional_decimal")]
    pub daily_cost: Option<Decimal>,

    /// Maximum P95 latency in milliseconds
    #[serde(default)]
    pub latency_p95: Option<f64>,

    /// Minimum mean quality score as a fraction
    #[serde(default)]
    pub quality_score: Option<f64>,
}

impl AlertThresholds {
    /// Thresholds suited to a production deployment
    pub fn production() -> Self {
        Self {
            error_rate: Some(0.05),
            daily_cost: Some(Decimal::ONE_HUNDRED),
            latency_p95: Some(5000.0),
            quality_score: Some(0.7),
        }
    }

    /// Whether no check is configured
    pub fn is_empty(&self) -> bool {
        self.error_rate.is_none()
            && self.daily_cost.is_none()
            && self.latency_p95.is_none()
            && self.quality_score.is_none()
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Slack webhook
    Slack {
        /// Incoming webhook URL
        webhook_url: String,
        /// Channel override
        #[serde(default)]
        channel: Option<String>,
    },
    /// Generic webhook
    Webhook {
        /// Target URL
        url: String,
        /// Extra request headers
        #[serde(default)]
        headers: Option<serde_json::Value>,
    },
    /// PagerDuty
    PagerDuty {
        /// Integration routing key
        routing_key: String,
        /// Events API endpoint, defaults to the public PagerDuty endpoint
        #[serde(default)]
        events_url: Option<String>,
    },
}

impl NotificationChannel {
    /// Short channel type name
    pub fn channel_type(&self) -> &'static str {
        match self {
            Self::Slack { .. } => "slack",
            Self::Webhook { .. } => "webhook",
            Self::PagerDuty { .. } => "pagerduty",
        }
    }
}
