use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::types::ShelfLocation;

/// Prometheus default histogram buckets, in seconds.
pub const LATENCY_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Debug, Clone, Default)]
struct LatencyHistogram {
    buckets: [u64; LATENCY_BUCKETS.len()],
    count: u64,
    sum_seconds: f64,
}

impl LatencyHistogram {
    fn observe(&mut self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        for (slot, bound) in self.buckets.iter_mut().zip(LATENCY_BUCKETS.iter()) {
            if secs <= *bound {
                *slot += 1;
            }
        }
        self.count += 1;
        self.sum_seconds += secs;
    }
}

/// Label set of the current-location gauge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentShelf {
    pub shelf: String,
    pub shelf_id: u32,
    pub row: u32,
}

/// Ingestion metrics, shared by handle between the catalog client, the
/// session controller and the metrics endpoint.
#[derive(Clone)]
pub struct Metrics {
    pub scans_received: Arc<AtomicU64>,
    pub scans_discarded: Arc<AtomicU64>,
    pub books_processed: Arc<AtomicU64>,
    pub books_failed: Arc<AtomicU64>,
    pub shelf_changes: Arc<AtomicU64>,
    pub shelf_rejections: Arc<AtomicU64>,
    requests: Arc<Mutex<BTreeMap<(&'static str, &'static str), LatencyHistogram>>>,
    current_shelf: Arc<Mutex<Option<CurrentShelf>>>,
    last_scan_at: Arc<Mutex<Option<DateTime<Utc>>>>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scans_received: Arc::new(AtomicU64::new(0)),
            scans_discarded: Arc::new(AtomicU64::new(0)),
            books_processed: Arc::new(AtomicU64::new(0)),
            books_failed: Arc::new(AtomicU64::new(0)),
            shelf_changes: Arc::new(AtomicU64::new(0)),
            shelf_rejections: Arc::new(AtomicU64::new(0)),
            requests: Arc::new(Mutex::new(BTreeMap::new())),
            current_shelf: Arc::new(Mutex::new(None)),
            last_scan_at: Arc::new(Mutex::new(None)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_scans_received(&self) {
        self.scans_received.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut at) = self.last_scan_at.lock() {
            *at = Some(Utc::now());
        }
    }

    pub fn inc_scans_discarded(&self) {
        self.scans_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_books_processed(&self) {
        self.books_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_books_failed(&self) {
        self.books_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shelf_changes(&self) {
        self.shelf_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shelf_rejections(&self) {
        self.shelf_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one outbound catalog call.
    pub fn observe_request(&self, operation: &'static str, outcome: &'static str, elapsed: Duration) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.entry((operation, outcome)).or_default().observe(elapsed);
        }
    }

    /// Number of recorded calls for an operation/outcome pair.
    pub fn request_count(&self, operation: &str, outcome: &str) -> u64 {
        self.requests
            .lock()
            .map(|r| {
                r.iter()
                    .filter(|((op, out), _)| *op == operation && *out == outcome)
                    .map(|(_, h)| h.count)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Point the current-location gauge at a new shelf/row.
    pub fn set_current_shelf(&self, name: &str, location: ShelfLocation) {
        if let Ok(mut current) = self.current_shelf.lock() {
            *current = Some(CurrentShelf {
                shelf: name.to_string(),
                shelf_id: location.shelf_id,
                row: location.row_number,
            });
        }
    }

    pub fn current_shelf(&self) -> Option<CurrentShelf> {
        self.current_shelf.lock().ok().and_then(|c| c.clone())
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scans_received: self.scans_received.load(Ordering::Relaxed),
            scans_discarded: self.scans_discarded.load(Ordering::Relaxed),
            books_processed: self.books_processed.load(Ordering::Relaxed),
            books_failed: self.books_failed.load(Ordering::Relaxed),
            shelf_changes: self.shelf_changes.load(Ordering::Relaxed),
            shelf_rejections: self.shelf_rejections.load(Ordering::Relaxed),
            current_shelf: self.current_shelf(),
            last_scan_at: self.last_scan_at.lock().ok().and_then(|t| *t),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition format (0.0.4).
    pub fn render_prometheus(&self) -> String {
        let m = self.get_snapshot();
        let mut out = String::with_capacity(2048);

        let counters = [
            ("shelfscan_scans_received_total", "Completed scans read from the device", m.scans_received),
            ("shelfscan_scans_discarded_total", "Scans discarded for having the wrong length", m.scans_discarded),
            ("shelfscan_books_processed_total", "Books ingested successfully", m.books_processed),
            ("shelfscan_books_failed_total", "Books that failed to ingest", m.books_failed),
            ("shelfscan_shelf_changes_total", "Successful shelf code resolutions", m.shelf_changes),
            ("shelfscan_shelf_rejections_total", "Shelf codes that could not be resolved", m.shelf_rejections),
        ];
        for (name, help, value) in counters {
            let _ = write!(out, "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n");
        }

        out.push_str("# HELP shelfscan_current_shelf The current shelf and row\n");
        out.push_str("# TYPE shelfscan_current_shelf gauge\n");
        if let Some(c) = &m.current_shelf {
            let _ = writeln!(
                out,
                "shelfscan_current_shelf{{shelf=\"{}\",shelf_id=\"{}\",row=\"{}\"}} 1",
                escape_label(&c.shelf),
                c.shelf_id,
                c.row
            );
        }

        let requests = self.requests.lock().map(|r| r.clone()).unwrap_or_default();
        out.push_str("# HELP shelfscan_catalog_requests_total Catalog requests by operation and outcome\n");
        out.push_str("# TYPE shelfscan_catalog_requests_total counter\n");
        for ((op, outcome), h) in &requests {
            let _ = writeln!(
                out,
                "shelfscan_catalog_requests_total{{operation=\"{op}\",outcome=\"{outcome}\"}} {}",
                h.count
            );
        }

        out.push_str("# HELP shelfscan_catalog_request_duration_seconds Catalog request latency\n");
        out.push_str("# TYPE shelfscan_catalog_request_duration_seconds histogram\n");
        for ((op, outcome), h) in &requests {
            for (bound, count) in LATENCY_BUCKETS.iter().zip(h.buckets.iter()) {
                let _ = writeln!(
                    out,
                    "shelfscan_catalog_request_duration_seconds_bucket{{operation=\"{op}\",outcome=\"{outcome}\",le=\"{bound}\"}} {count}"
                );
            }
            let _ = writeln!(
                out,
                "shelfscan_catalog_request_duration_seconds_bucket{{operation=\"{op}\",outcome=\"{outcome}\",le=\"+Inf\"}} {}",
                h.count
            );
            let _ = writeln!(
                out,
                "shelfscan_catalog_request_duration_seconds_sum{{operation=\"{op}\",outcome=\"{outcome}\"}} {}",
                h.sum_seconds
            );
            let _ = writeln!(
                out,
                "shelfscan_catalog_request_duration_seconds_count{{operation=\"{op}\",outcome=\"{outcome}\"}} {}",
                h.count
            );
        }

        let _ = write!(
            out,
            "# HELP shelfscan_uptime_seconds Uptime seconds\n# TYPE shelfscan_uptime_seconds gauge\nshelfscan_uptime_seconds {}\n",
            m.uptime_seconds
        );
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub scans_received: u64,
    pub scans_discarded: u64,
    pub books_processed: u64,
    pub books_failed: u64,
    pub shelf_changes: u64,
    pub shelf_rejections: u64,
    pub current_shelf: Option<CurrentShelf>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
}
