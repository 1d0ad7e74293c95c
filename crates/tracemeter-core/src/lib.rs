//! # Tracemeter
//!
//! Usage, cost and alerting reports for LLM observability platforms.
//!
//! Tracemeter pulls pre-aggregated metric buckets from a platform's public
//! API, folds them into a summary, checks the summary against alert
//! thresholds and renders text or JSON reports. It can also export the raw
//! trace list to a JSON file.
//!
//! ## Architecture
//!
//! - **Fetch**: lazy, cancellable page streams over a pluggable transport
//! - **Aggregation**: single-pass reduction with exact decimal costs
//! - **Alerting**: threshold evaluation and Slack/webhook/PagerDuty delivery
//! - **Report**: dashboard, cost report, JSON report and trace export
//!
//! ## Quick Start
//!
//! ```bash
//! # Cost breakdown for the last week
//! tracemeter costs --days 7
//!
//! # Export traces of the last three days
//! tracemeter export --days 3 --output traces.json
//!
//! # Dashboard and alerts for the last day, notifying configured channels
//! tracemeter monitor --notify
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod aggregation;
pub mod alerting;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod models;
pub mod report;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::aggregation::{aggregate_stream, AggregateOutcome, MetricsAggregator};
    pub use crate::alerting::{AlertEvaluator, NotificationSender};
    pub use crate::config::Config;
    pub use crate::error::{Error, FetchError, Result};
    pub use crate::fetch::{HttpTransport, MetricsFetcher, Transport};
    pub use crate::models::*;
}
