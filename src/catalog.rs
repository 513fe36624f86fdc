//! Catalog service client.
//!
//! Every call is bounded by the configured timeout, raced against the
//! shutdown token, and recorded in the request counter/latency histogram
//! keyed by operation and outcome.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::metrics::Metrics;
use crate::types::{Book, IngestionRequest, Shelf};

const OP_RESOLVE_SHELF: &str = "resolve_shelf";
const OP_INGEST: &str = "ingest";
const MAX_ERROR_BODY: usize = 512;

/// What the session controller needs from the catalog.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn resolve_shelf(&self, shelf_id: u32, cancel: &CancellationToken) -> Result<Shelf, CatalogError>;

    /// Store a book at a location. Re-ingesting a known ISBN moves it.
    ///
    /// Any 2xx is a stored book; the record is `None` when the reply body
    /// could not be read as one.
    async fn ingest(&self, request: &IngestionRequest, cancel: &CancellationToken)
        -> Result<Option<Book>, CatalogError>;
}

#[derive(Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    metrics: Metrics,
}

impl CatalogClient {
    pub fn new(cfg: &CatalogConfig, metrics: Metrics) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .connect_timeout(cfg.connect_timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let raw = cfg.base_url.trim();
        let base_url = Url::parse(raw)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| CatalogError::InvalidBaseUrl(raw.to_string()))?;
        Ok(Self {
            http,
            base_url,
            timeout: cfg.timeout(),
            metrics,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn instrumented<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T, CatalogError>
    where
        F: Future<Output = Result<T, CatalogError>>,
    {
        let started = Instant::now();
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(CatalogError::Cancelled),
            r = tokio::time::timeout(self.timeout, call) => match r {
                Ok(inner) => inner,
                Err(_) => Err(CatalogError::Timeout(self.timeout)),
            },
        };
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.outcome(),
        };
        let elapsed = started.elapsed();
        self.metrics.observe_request(operation, outcome, elapsed);
        debug!(operation, outcome, elapsed_ms = elapsed.as_millis() as u64, "catalog request finished");
        result
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn resolve_shelf(&self, shelf_id: u32, cancel: &CancellationToken) -> Result<Shelf, CatalogError> {
        let url = self.endpoint(&["shelf", &shelf_id.to_string()]);
        self.instrumented(OP_RESOLVE_SHELF, cancel, async {
            let resp = self.http.get(url).send().await?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Err(CatalogError::NotFound { shelf_id });
            }
            let body = read_success_body(resp).await?;
            Ok(serde_json::from_str::<Shelf>(&body)?)
        })
        .await
    }

    async fn ingest(
        &self,
        request: &IngestionRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<Book>, CatalogError> {
        let url = self.endpoint(&["books", &request.isbn]);
        self.instrumented(OP_INGEST, cancel, async {
            let resp = self
                .http
                .post(url)
                .query(&[("shelf_id", request.shelf_id), ("row_number", request.row_number)])
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .send()
                .await?;
            let body = read_success_body(resp).await?;
            match serde_json::from_str::<Book>(&body) {
                Ok(book) => Ok(Some(book)),
                Err(e) => {
                    warn!(isbn = %request.isbn, error = %e, "book stored, but the reply is not a book record");
                    Ok(None)
                }
            }
        })
        .await
    }
}

/// Body of a 2xx response; anything else becomes [`CatalogError::Status`].
async fn read_success_body(resp: reqwest::Response) -> Result<String, CatalogError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        let mut body = body;
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(CatalogError::Status { status: status.as_u16(), body });
    }
    Ok(body)
}
