//! Aggregation of metric buckets into a [`Summary`](crate::models::Summary)

mod aggregator;

pub use aggregator::{aggregate_stream, AggregateOutcome, MetricsAggregator};
