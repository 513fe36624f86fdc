use std::sync::Arc;

use crate::config::AppConfig;
use crate::metrics::Metrics;

/// State shared with the metrics HTTP endpoint.
///
/// Cheap to clone: the configuration sits behind an `Arc` and [`Metrics`] is
/// itself a handle onto shared counters.
#[derive(Clone)]
pub struct AppState {
    /// The loaded configuration, exposed read-only.
    pub config: Arc<AppConfig>,
    /// The same metrics handle the catalog client and the session controller
    /// write to.
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: AppConfig, metrics: Metrics) -> Self {
        Self { config: Arc::new(config), metrics }
    }
}
