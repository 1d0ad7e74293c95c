//! Query and paging types shared between the fetcher and transports

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A validated `[start, end]` time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::invalid_range(format!(
                "start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `now`
    pub fn last_days(days: u32, now: DateTime<Utc>) -> Result<Self> {
        if days == 0 {
            return Err(Error::invalid_range("day count must be a positive integer"));
        }
        let start = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| Error::invalid_range(format!("{days} days is out of range")))?;
        Self::new(start, now)
    }

    /// Range start
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Range end
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// One page request against a paginated endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    /// Range start (RFC 3339)
    pub from_timestamp: DateTime<Utc>,
    /// Range end (RFC 3339)
    pub to_timestamp: DateTime<Utc>,
    /// 1-based page number
    pub page: u32,
    /// Page size
    pub limit: u32,
}

impl PageRequest {
    /// Request page `page` of `range`
    pub fn new(range: TimeRange, page: u32, limit: u32) -> Self {
        Self {
            from_timestamp: range.start(),
            to_timestamp: range.end(),
            page,
            limit,
        }
    }
}

/// A page of results
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    /// Records on this page
    pub data: Vec<T>,

    /// Pagination metadata, when the API sends it
    #[serde(default)]
    pub meta: Option<PageMeta>,
}

impl<T> Page<T> {
    /// A page without metadata
    pub fn new(data: Vec<T>) -> Self {
        Self { data, meta: None }
    }

    /// Whether no further page should be requested after `page`
    pub fn is_last(&self, page: u32) -> bool {
        if self.data.is_empty() {
            return true;
        }
        self.meta
            .as_ref()
            .and_then(|meta| meta.total_pages)
            .is_some_and(|total| page >= total)
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PageMeta {
    /// Current page
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size
    #[serde(default)]
    pub limit: Option<u32>,
    /// Total number of items
    #[serde(default, alias = "totalItems")]
    pub total_items: Option<u64>,
    /// Total number of pages
    #[serde(default, alias = "totalPages")]
    pub total_pages: Option<u32>,
}
