//! Error taxonomy for the scan-ingestion pipeline.
//!
//! None of these are fatal once the process is running. Device errors are
//! absorbed by the reader's retry loop, decode and lookup errors keep the
//! previous session location, and ingestion errors only bump a counter.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures talking to the scanner hardware.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("cannot open input device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot grab input device {path}: {source}")]
    Grab {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("device read failed: {0}")]
    Read(#[source] std::io::Error),
    #[error("hardware input devices are not supported on this platform")]
    Unsupported,
}

/// A scanned shelf code could not be turned into a location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty shelf code")]
    Empty,
    #[error("shelf code {0:?} is not numeric")]
    NonNumeric(String),
    #[error("shelf code {0:?} is out of range")]
    Overflow(String),
    #[error("shelf code {code:?} has check digit {found}, expected {expected}")]
    ChecksumMismatch { code: String, expected: u8, found: u8 },
}

/// A location cannot be printed as an 8-digit label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("shelf id {0} does not fit in six digits")]
    ShelfOutOfRange(u32),
    #[error("row number {0} does not fit in one digit")]
    RowOutOfRange(u32),
}

/// A scan that is neither a shelf code nor an ISBN-13.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("scan has {len} characters, expected 8 (shelf code) or 13 (ISBN)")]
    WrongLength { len: usize },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("shelf {shelf_id} is not known to the catalog")]
    NotFound { shelf_id: u32 },
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("catalog response could not be decoded: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("catalog request timed out after {0:?}")]
    Timeout(Duration),
    #[error("catalog request cancelled")]
    Cancelled,
    #[error("invalid catalog base URL {0:?}")]
    InvalidBaseUrl(String),
}

impl CatalogError {
    /// Low-cardinality label for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            CatalogError::NotFound { .. } => "not_found",
            CatalogError::Transport(_) => "transport",
            CatalogError::Status { .. } => "status",
            CatalogError::InvalidBody(_) => "invalid_body",
            CatalogError::Timeout(_) => "timeout",
            CatalogError::Cancelled => "cancelled",
            CatalogError::InvalidBaseUrl(_) => "invalid_url",
        }
    }
}

/// Why a scanned shelf code did not change the current location.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Lookup(#[from] CatalogError),
}
