//! Data models for Tracemeter

mod alert;
mod metrics;
mod query;
mod trace;

pub use alert::*;
pub use metrics::*;
pub use query::*;
pub use trace::*;
