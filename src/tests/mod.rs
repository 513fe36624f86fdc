//! Unit and integration tests for shelfscan.
//!
//! ## Test Modules
//!
//! - **codec_tests**: shelf-code decoding, label encoding, check digits
//! - **device_tests**: key accumulation, device reader state machine, stdin transport
//! - **catalog_tests**: catalog client against an in-process fake catalog
//! - **session_tests**: session controller transitions and counters
//! - **config_tests**: configuration layering and validation
//! - **health_api_tests**: metrics and health endpoints
//!
//! ```bash
//! cargo test
//! cargo test session_tests
//! ```

pub mod device_tests;
