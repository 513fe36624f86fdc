//! # shelfscan
//!
//! Scan-ingestion pipeline for a personal library catalog. A barcode scanner
//! reads either an ISBN-13 from a book or an 8-digit shelf code from a
//! location label; shelf codes set the current shelf/row, ISBNs are sent to
//! the catalog service to be filed at that location.
//!
//! ## Core Components
//!
//! - [`device`]: reassembles scanner keystrokes into codes behind a bounded queue
//! - [`codec`]: shelf-code encoding and decoding
//! - [`catalog`]: HTTP client for the catalog service
//! - [`session`]: the scan loop and the current-location state
//! - [`metrics`]: counters, gauge and latency histograms
//! - [`routes`]: `/healthz`, `/metrics` and friends
//! - [`config`]: layered configuration
//! - [`error`]: error taxonomy
//! - [`state`]: state shared with the HTTP endpoints
//! - [`types`]: scan classification and wire types

pub mod catalog;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod session;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
