//! Session controller.
//!
//! Pulls completed scans off the queue one at a time and gives them meaning:
//! shelf codes move the current location, ISBNs are ingested at it, anything
//! else is dropped. The controller is the only writer of [`SessionState`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::CatalogApi;
use crate::codec;
use crate::device::ScanReceiver;
use crate::error::LocationError;
use crate::metrics::Metrics;
use crate::types::{IngestionRequest, ScanKind, Shelf, ShelfLocation};

pub const UNKNOWN_SHELF_NAME: &str = "unknown";

/// Where the next ISBN will be filed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub current: ShelfLocation,
    pub shelf_name: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            current: ShelfLocation::UNKNOWN,
            shelf_name: UNKNOWN_SHELF_NAME.to_string(),
        }
    }
}

/// What a single scan did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    ShelfChanged(ShelfLocation),
    ShelfRejected,
    Ingested,
    IngestFailed,
    Discarded,
}

pub struct SessionController {
    catalog: Arc<dyn CatalogApi>,
    metrics: Metrics,
    state: SessionState,
    verify_check_digit: bool,
}

impl SessionController {
    pub fn new(catalog: Arc<dyn CatalogApi>, metrics: Metrics) -> Self {
        Self {
            catalog,
            metrics,
            state: SessionState::default(),
            verify_check_digit: false,
        }
    }

    /// Reject shelf codes whose EAN-8 check digit does not match.
    pub fn with_check_digit_verification(mut self, enabled: bool) -> Self {
        self.verify_check_digit = enabled;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Look up a display name for the unknown location. Failure is not fatal;
    /// the session simply starts out labelled "unknown".
    pub async fn initialize(&mut self, cancel: &CancellationToken) {
        match self.catalog.resolve_shelf(ShelfLocation::UNKNOWN.shelf_id, cancel).await {
            Ok(shelf) => self.state.shelf_name = shelf.name,
            Err(e) => warn!(error = %e, "cannot resolve the default shelf, starting as unknown"),
        }
        self.metrics.set_current_shelf(&self.state.shelf_name, self.state.current);
        info!(shelf = %self.state.shelf_name, location = %self.state.current, "session started");
    }

    /// Consume scans until the queue closes or shutdown is requested.
    pub async fn run(&mut self, scans: &mut ScanReceiver, cancel: &CancellationToken) {
        loop {
            let code = tokio::select! {
                _ = cancel.cancelled() => break,
                c = scans.next_code() => c,
            };
            match code {
                Some(code) => {
                    self.handle_scan(&code, cancel).await;
                }
                None => {
                    info!("scan source closed");
                    break;
                }
            }
        }
    }

    pub async fn handle_scan(&mut self, code: &str, cancel: &CancellationToken) -> ScanOutcome {
        self.metrics.inc_scans_received();
        match ScanKind::classify(code) {
            Ok(ScanKind::ShelfCode) => match self.resolve_location(code, cancel).await {
                Ok((shelf, location)) => {
                    self.state = SessionState { current: location, shelf_name: shelf.name };
                    self.metrics.inc_shelf_changes();
                    self.metrics.set_current_shelf(&self.state.shelf_name, location);
                    info!(shelf = %self.state.shelf_name, shelf_id = location.shelf_id, row = location.row_number, "shelf changed");
                    ScanOutcome::ShelfChanged(location)
                }
                Err(e) => {
                    self.metrics.inc_shelf_rejections();
                    warn!(
                        code,
                        error = %e,
                        prev_shelf = %self.state.shelf_name,
                        prev_row = self.state.current.row_number,
                        "cannot resolve shelf code, keeping previous shelf"
                    );
                    ScanOutcome::ShelfRejected
                }
            },
            Ok(ScanKind::Isbn) => {
                let request = IngestionRequest::at(code, self.state.current);
                info!(isbn = %request.isbn, shelf = %self.state.shelf_name, row = request.row_number, "ingesting book");
                match self.catalog.ingest(&request, cancel).await {
                    Ok(book) => {
                        self.metrics.inc_books_processed();
                        let title = book.map(|b| b.title).unwrap_or_default();
                        info!(isbn = %request.isbn, title = %title, "book stored");
                        ScanOutcome::Ingested
                    }
                    Err(e) => {
                        self.metrics.inc_books_failed();
                        error!(isbn = %request.isbn, error = %e, "cannot ingest book");
                        ScanOutcome::IngestFailed
                    }
                }
            }
            Err(e) => {
                self.metrics.inc_scans_discarded();
                info!(code, error = %e, "discarding scan");
                ScanOutcome::Discarded
            }
        }
    }

    async fn resolve_location(
        &self,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<(Shelf, ShelfLocation), LocationError> {
        let location = if self.verify_check_digit {
            codec::decode_verified(code)?
        } else {
            codec::decode(code)?
        };
        let shelf = self.catalog.resolve_shelf(location.shelf_id, cancel).await?;
        Ok((shelf, location))
    }
}
