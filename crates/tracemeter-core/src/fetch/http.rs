//! HTTP transport for the platform's public API

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, FetchError, Result};
use crate::models::{MetricRecord, Page, PageRequest, TraceRecord};

use super::Transport;

const METRICS_PATH: &str = "api/public/metrics/daily";
const TRACES_PATH: &str = "api/public/traces";

/// [`Transport`] over the platform's REST API
pub struct HttpTransport {
    client: RwLock<Client>,
    timeout: Duration,
    base_url: Url,
    credentials: Option<(String, String)>,
}

impl HttpTransport {
    /// Create a transport from the API configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut host = config.host.trim().to_string();
        if !host.ends_with('/') {
            host.push('/');
        }
        let base_url = Url::parse(&host)
            .map_err(|e| Error::config(format!("invalid api.host '{}': {e}", config.host)))?;

        let client = build_client(config.timeout)
            .map_err(|e| Error::config(format!("failed to create HTTP client: {e}")))?;

        let credentials = match (&config.public_key, &config.secret_key) {
            (Some(public), Some(secret)) => Some((public.clone(), secret.clone())),
            _ => None,
        };

        Ok(Self {
            client: RwLock::new(client),
            timeout: config.timeout,
            base_url,
            credentials,
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[instrument(skip(self, request), fields(page = request.page))]
    async fn get_page<R: DeserializeOwned>(
        &self,
        path: &str,
        request: &PageRequest,
    ) -> std::result::Result<Page<R>, FetchError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| FetchError::malformed(format!("invalid endpoint {path}: {e}")))?;

        let client = self
            .client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut builder = client.get(url).query(&[
            ("from_timestamp", request.from_timestamp.to_rfc3339()),
            ("to_timestamp", request.to_timestamp.to_rfc3339()),
            ("page", request.page.to_string()),
            ("limit", request.limit.to_string()),
        ]);

        if let Some((public, secret)) = &self.credentials {
            builder = builder.basic_auth(public, Some(secret));
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        let page: Page<R> =
            serde_json::from_slice(&body).map_err(|e| FetchError::malformed(e.to_string()))?;

        debug!(records = page.data.len(), "Decoded page");
        Ok(page)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn metrics_page(
        &self,
        request: &PageRequest,
    ) -> std::result::Result<Page<MetricRecord>, FetchError> {
        let page: Page<MetricRecord> = self.get_page(METRICS_PATH, request).await?;

        for record in &page.data {
            record.validate().map_err(FetchError::Malformed)?;
        }

        Ok(page)
    }

    async fn traces_page(
        &self,
        request: &PageRequest,
    ) -> std::result::Result<Page<TraceRecord>, FetchError> {
        self.get_page(TRACES_PATH, request).await
    }

    /// Swap in a fresh client so the idle connections of the finished fetch
    /// are dropped with the old pool. Requests still in flight keep their own
    /// handle to the old client.
    fn close(&self) {
        match build_client(self.timeout) {
            Ok(fresh) => {
                *self.client.write().unwrap_or_else(PoisonError::into_inner) = fresh;
                debug!(host = %self.base_url, "Released HTTP connection pool");
            }
            Err(e) => warn!(error = %e, "Could not rebuild HTTP client, keeping the old pool"),
        }
    }
}

fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tracemeter/", env!("CARGO_PKG_VERSION")))
        .build()
}
