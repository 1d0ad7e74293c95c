//! Trace data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trace as listed by the platform and written by the export.
///
/// Every key is always serialized; absent values are written as `null` so
/// consumers can rely on key presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Trace id
    pub id: String,

    /// Trace name
    pub name: Option<String>,

    /// When the trace started
    pub timestamp: Option<DateTime<Utc>>,

    /// End user
    #[serde(alias = "userId")]
    pub user_id: Option<String>,

    /// Session the trace belongs to
    #[serde(alias = "sessionId")]
    pub session_id: Option<String>,

    /// Free-form metadata
    pub metadata: Option<serde_json::Value>,

    /// Tags for filtering
    pub tags: Option<Vec<String>>,

    /// Trace input
    pub input: Option<serde_json::Value>,

    /// Trace output
    pub output: Option<serde_json::Value>,
}

impl TraceRecord {
    /// A record with only an id set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            timestamp: None,
            user_id: None,
            session_id: None,
            metadata: None,
            tags: None,
            input: None,
            output: None,
        }
    }
}
