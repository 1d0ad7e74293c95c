//! Fetcher module - paginated retrieval from the platform API
//!
//! A [`MetricsFetcher`] turns the page-oriented [`Transport`] into lazy
//! streams of records. Streams are not restartable: start a new fetch to
//! replay a range.

mod http;

pub use http::HttpTransport;

use std::future::Future;
use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, FetchError, Result};
use crate::models::{MetricRecord, Page, PageRequest, TimeRange, TraceRecord};

/// Page size used when none is configured
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Page-level access to the platform API
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Fetch one page of daily metric buckets
    async fn metrics_page(
        &self,
        request: &PageRequest,
    ) -> std::result::Result<Page<MetricRecord>, FetchError>;

    /// Fetch one page of traces
    async fn traces_page(
        &self,
        request: &PageRequest,
    ) -> std::result::Result<Page<TraceRecord>, FetchError>;

    /// Release the connections held for a fetch. Called once when a fetch
    /// ends; the transport must stay usable for the next fetch.
    fn close(&self) {}
}

/// Streams records out of a [`Transport`]
pub struct MetricsFetcher<T: ?Sized> {
    transport: Arc<T>,
    page_size: u32,
}

impl<T: ?Sized> Clone for MetricsFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            page_size: self.page_size,
        }
    }
}

impl<T> MetricsFetcher<T>
where
    T: Transport + ?Sized + 'static,
{
    /// Create a fetcher over an explicitly constructed transport
    pub fn new(transport: Arc<T>, page_size: u32) -> Self {
        let page_size = if page_size == 0 {
            warn!("Page size 0 requested, using {}", DEFAULT_PAGE_SIZE);
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };

        Self {
            transport,
            page_size,
        }
    }

    /// Page size used for requests
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Stream the metric buckets of `range` in ascending bucket order
    pub fn fetch_metrics(
        &self,
        range: TimeRange,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<MetricRecord>> + Send + 'static {
        paginate(
            Arc::clone(&self.transport),
            range,
            self.page_size,
            cancel,
            "metrics",
            |transport: Arc<T>, request: PageRequest| async move {
                transport.metrics_page(&request).await
            },
        )
    }

    /// Stream the traces of `range`
    pub fn fetch_traces(
        &self,
        range: TimeRange,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<TraceRecord>> + Send + 'static {
        paginate(
            Arc::clone(&self.transport),
            range,
            self.page_size,
            cancel,
            "traces",
            |transport: Arc<T>, request: PageRequest| async move {
                transport.traces_page(&request).await
            },
        )
    }
}

/// Closes the transport when a fetch stream finishes or is dropped
struct CloseGuard<T: Transport + ?Sized> {
    transport: Arc<T>,
    resource: &'static str,
    pages: u32,
}

impl<T: Transport + ?Sized> Drop for CloseGuard<T> {
    fn drop(&mut self) {
        debug!(resource = self.resource, pages = self.pages, "Closing transport");
        self.transport.close();
    }
}

fn paginate<T, R, F, Fut>(
    transport: Arc<T>,
    range: TimeRange,
    limit: u32,
    cancel: CancellationToken,
    resource: &'static str,
    fetch_page: F,
) -> impl Stream<Item = Result<R>> + Send + 'static
where
    T: Transport + ?Sized + 'static,
    R: Send + 'static,
    F: Fn(Arc<T>, PageRequest) -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<Page<R>, FetchError>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut guard = CloseGuard {
            transport: Arc::clone(&transport),
            resource,
            pages: 0,
        };
        let mut page = 1u32;

        loop {
            if cancel.is_cancelled() {
                info!(resource, page, "Fetch cancelled");
                break;
            }

            info!(resource, page, "Fetching page");
            let request = PageRequest::new(range, page, limit);

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = fetch_page(Arc::clone(&transport), request) => Some(result),
            };

            let Some(result) = result else {
                info!(resource, page, "Fetch cancelled during request");
                break;
            };

            let batch = result.map_err(|cause| Error::Fetch { page, cause })?;
            guard.pages = page;

            let last = batch.is_last(page);
            debug!(resource, page, records = batch.data.len(), last, "Received page");

            for record in batch.data {
                yield record;
            }

            if last {
                break;
            }
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Transport that replays scripted metric pages
    #[derive(Default)]
    struct ScriptedTransport {
        pages: Mutex<VecDeque<std::result::Result<Page<MetricRecord>, FetchError>>>,
        requests: Mutex<Vec<PageRequest>>,
        closes: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(pages: Vec<std::result::Result<Page<MetricRecord>, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                ..Self::default()
            })
        }

        fn requested_pages(&self) -> Vec<u32> {
            self.requests.lock().unwrap().iter().map(|r| r.page).collect()
        }

        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn metrics_page(
            &self,
            request: &PageRequest,
        ) -> std::result::Result<Page<MetricRecord>, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Page::new(vec![])))
        }

        async fn traces_page(
            &self,
            request: &PageRequest,
        ) -> std::result::Result<Page<TraceRecord>, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(Page::new(vec![]))
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn bucket(name: &str) -> MetricRecord {
        MetricRecord {
            bucket: name.to_string(),
            trace_count: 1,
            ..MetricRecord::default()
        }
    }

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 8, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_pages_until_empty() {
        let transport = ScriptedTransport::new(vec![
            Ok(Page::new(vec![bucket("d1"), bucket("d2")])),
            Ok(Page::new(vec![bucket("d3")])),
        ]);
        let fetcher = MetricsFetcher::new(Arc::clone(&transport), 2);

        let records: Vec<_> = fetcher
            .fetch_metrics(range(), CancellationToken::new())
            .collect()
            .await;

        let buckets: Vec<String> = records.into_iter().map(|r| r.unwrap().bucket).collect();
        assert_eq!(buckets, vec!["d1", "d2", "d3"]);
        assert_eq!(transport.requested_pages(), vec![1, 2, 3]);
        assert_eq!(transport.closes(), 1);

        let first = transport.requests.lock().unwrap()[0].clone();
        assert_eq!(first.limit, 2);
        assert_eq!(first.from_timestamp, range().start());
        assert_eq!(first.to_timestamp, range().end());
    }

    #[tokio::test]
    async fn test_failure_stops_the_page_loop() {
        let transport = ScriptedTransport::new(vec![
            Ok(Page::new(vec![bucket("d1")])),
            Err(FetchError::RateLimited),
            Ok(Page::new(vec![bucket("never")])),
        ]);
        let fetcher = MetricsFetcher::new(Arc::clone(&transport), 1);

        let records: Vec<_> = fetcher
            .fetch_metrics(range(), CancellationToken::new())
            .collect()
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap().bucket, "d1");
        assert!(matches!(
            records[1],
            Err(Error::Fetch {
                page: 2,
                cause: FetchError::RateLimited
            })
        ));
        assert_eq!(transport.requested_pages(), vec![1, 2]);
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_page() {
        let transport = ScriptedTransport::new(vec![Ok(Page::new(vec![bucket("d1")]))]);
        let fetcher = MetricsFetcher::new(Arc::clone(&transport), 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let records: Vec<_> = fetcher.fetch_metrics(range(), cancel).collect().await;

        assert!(records.is_empty());
        assert!(transport.requested_pages().is_empty());
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn test_cancel_between_pages_keeps_yielded_records() {
        let transport = ScriptedTransport::new(vec![
            Ok(Page::new(vec![bucket("d1")])),
            Ok(Page::new(vec![bucket("d2")])),
        ]);
        let fetcher = MetricsFetcher::new(Arc::clone(&transport), 1);
        let cancel = CancellationToken::new();

        let stream = fetcher.fetch_metrics(range(), cancel.clone());
        futures::pin_mut!(stream);

        let first = stream.next().await.unwrap().unwrap();
        cancel.cancel();
        let rest: Vec<_> = stream.collect().await;

        assert_eq!(first.bucket, "d1");
        assert!(rest.is_empty());
        assert_eq!(transport.requested_pages(), vec![1]);
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn test_dropping_the_stream_closes_transport() {
        let transport = ScriptedTransport::new(vec![Ok(Page::new(vec![bucket("d1"), bucket("d2")]))]);
        let fetcher = MetricsFetcher::new(Arc::clone(&transport), 2);

        {
            let stream = fetcher.fetch_metrics(range(), CancellationToken::new());
            futures::pin_mut!(stream);
            let _ = stream.next().await;
        }

        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn test_traces_use_the_same_paging() {
        let transport = ScriptedTransport::new(vec![]);
        let fetcher = MetricsFetcher::new(Arc::clone(&transport), 0);
        assert_eq!(fetcher.page_size(), DEFAULT_PAGE_SIZE);

        let traces: Vec<_> = fetcher
            .fetch_traces(range(), CancellationToken::new())
            .collect()
            .await;

        assert!(traces.is_empty());
        assert_eq!(transport.requested_pages(), vec![1]);
        assert_eq!(transport.closes(), 1);
    }
}
