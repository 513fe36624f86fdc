use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub path: Option<String>,
    pub queue_capacity: usize,
    pub retry_delay_ms: u64,
}

impl DeviceConfig {
    /// The scanner device path, if one is configured. An empty string counts as unset.
    pub fn device_path(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsServerConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CodecConfig {
    pub verify_check_digit: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub device: DeviceConfig,
    pub metrics: MetricsServerConfig,
    #[serde(default)]
    pub codec: CodecConfig,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

/// Command line values that take precedence over every configuration layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub input_device_path: Option<String>,
    pub metrics_port: Option<u16>,
}

pub fn load() -> anyhow::Result<AppConfig> {
    load_with(&Overrides::default())
}

pub fn load_with(overrides: &Overrides) -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: shelfscan.toml (in CWD)
        .add_source(::config::File::with_name("shelfscan").required(false));

    if let Ok(custom_path) = std::env::var("SHELFSCAN_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables after files, command line last
    builder = builder.add_source(::config::Environment::with_prefix("SHELFSCAN").separator("__"));

    builder = builder
        .set_override_option("catalog.base_url", overrides.server_url.clone())?
        .set_override_option("device.path", overrides.input_device_path.clone())?
        .set_override_option("metrics.port", overrides.metrics_port.map(i64::from))?;

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Catalog
    let url = cfg.catalog.base_url.trim();
    if url.is_empty() {
        return Err(anyhow::anyhow!("catalog.base_url must not be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(anyhow::anyhow!("catalog.base_url must be an http(s) URL: {}", url));
    }
    if cfg.catalog.timeout_ms == 0 {
        return Err(anyhow::anyhow!("catalog.timeout_ms must be > 0"));
    }
    if cfg.catalog.connect_timeout_ms == 0 {
        return Err(anyhow::anyhow!("catalog.connect_timeout_ms must be > 0"));
    }

    // Device
    if cfg.device.queue_capacity == 0 {
        return Err(anyhow::anyhow!("device.queue_capacity must be > 0"));
    }
    if cfg.device.retry_delay_ms == 0 {
        return Err(anyhow::anyhow!("device.retry_delay_ms must be > 0"));
    }

    // Metrics listener
    if cfg.metrics.enabled && cfg.metrics.port == 0 {
        return Err(anyhow::anyhow!("invalid metrics.port: {}", cfg.metrics.port));
    }
    #[cfg(unix)]
    if cfg.metrics.enabled && cfg.metrics.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.metrics.port);
    }

    Ok(())
}
