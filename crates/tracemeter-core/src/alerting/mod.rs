//! Alerting for Tracemeter
//!
//! Threshold checks over an aggregated summary and delivery of the
//! triggered alerts to chat and incident channels.

mod evaluator;
mod notifier;

pub use evaluator::AlertEvaluator;
pub use notifier::{NotificationError, NotificationResult, NotificationSender};
