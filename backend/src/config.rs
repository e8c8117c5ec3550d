//! Application configuration file support.
//!
//! Configuration is read from an `accessmap.toml` file and then adjusted with
//! environment variables. Every field has a default, so an empty file (or no
//! file at all) yields a working straight-line setup.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, ErrorContext};
use crate::models::RoutingMode;
use crate::services::distribution::DistributionConfig;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub aggregation: AggregationSettings,
}

/// HTTP bind settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Which routing provider answers route requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Great-circle distance divided by a per-mode speed.
    #[default]
    StraightLine,
    /// OSRM-compatible HTTP routing service.
    Osrm,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "straight_line" | "straight-line" | "haversine" => Ok(Self::StraightLine),
            "osrm" => Ok(Self::Osrm),
            _ => Err(format!("Unknown routing provider: {}", s)),
        }
    }
}

/// Travel speeds (m/s) used by the straight-line provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedSettings {
    #[serde(default = "default_walking_speed")]
    pub walking: f64,
    #[serde(default = "default_cycling_speed")]
    pub cycling: f64,
    #[serde(default = "default_transit_speed")]
    pub transit: f64,
    #[serde(default = "default_driving_speed")]
    pub driving: f64,
}

impl SpeedSettings {
    pub fn speed_for(&self, mode: RoutingMode) -> f64 {
        match mode {
            RoutingMode::Walking => self.walking,
            RoutingMode::Cycling => self.cycling,
            RoutingMode::Transit => self.transit,
            RoutingMode::Driving => self.driving,
        }
    }
}

impl Default for SpeedSettings {
    fn default() -> Self {
        Self {
            walking: default_walking_speed(),
            cycling: default_cycling_speed(),
            transit: default_transit_speed(),
            driving: default_driving_speed(),
        }
    }
}

fn default_walking_speed() -> f64 {
    1.4
}

fn default_cycling_speed() -> f64 {
    4.2
}

fn default_transit_speed() -> f64 {
    8.0
}

fn default_driving_speed() -> f64 {
    11.0
}

/// Route service settings: provider choice, batching and retry policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSettings {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default)]
    pub mode: RoutingMode,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_osrm_url")]
    pub osrm_url: String,
    /// Straight-line provider: pairs farther apart than this have no route.
    #[serde(default)]
    pub max_distance_meters: Option<f64>,
    #[serde(default)]
    pub speeds: SpeedSettings,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            mode: RoutingMode::default(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            osrm_url: default_osrm_url(),
            max_distance_meters: None,
            speeds: SpeedSettings::default(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    8
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_osrm_url() -> String {
    "http://localhost:5000".to_string()
}

/// Aggregation pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSettings {
    /// Points processed between cooperative yields.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Route arrivals between partial result publications.
    #[serde(default = "default_publish_every")]
    pub publish_every: usize,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            publish_every: default_publish_every(),
        }
    }
}

fn default_chunk_size() -> usize {
    2048
}

fn default_publish_every() -> usize {
    256
}

fn config_error(message: impl Into<String>, key: &str) -> ConfigError {
    ConfigError::with_context(
        message,
        ErrorContext::new("load_config").with_entity(key.to_string()),
    )
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| config_error(format!("{} has an invalid value '{}': {}", key, raw, e), key)),
        Err(_) => Ok(None),
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(AppConfig)` if the file was read, parsed and validated
    /// * `Err(ConfigError)` if the file cannot be read, parsed, or is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::new(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `accessmap.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    ///
    /// Falls back to defaults when no file exists.
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let search_paths = [
            PathBuf::from("accessmap.toml"),
            PathBuf::from("backend/accessmap.toml"),
            PathBuf::from("../accessmap.toml"),
        ];

        for path in search_paths.iter() {
            if path.exists() {
                log::info!("Using configuration file {}", path.display());
                return Self::from_file(path);
            }
        }

        log::info!("No accessmap.toml found, using default configuration");
        Ok(Self::default())
    }

    /// Override settings from environment variables.
    ///
    /// # Environment Variables
    /// - `ACCESSMAP_PROVIDER`: `straight_line` | `osrm`
    /// - `ACCESSMAP_OSRM_URL`: base URL of the OSRM service
    /// - `ACCESSMAP_MODE`: default routing mode
    /// - `ACCESSMAP_BATCH_SIZE`, `ACCESSMAP_CONCURRENCY`: route batching
    /// - `HOST`, `PORT`: server bind address
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(provider) = parse_env::<ProviderKind>("ACCESSMAP_PROVIDER")? {
            self.routing.provider = provider;
        }
        if let Ok(url) = env::var("ACCESSMAP_OSRM_URL") {
            self.routing.osrm_url = url;
        }
        if let Some(mode) = parse_env::<RoutingMode>("ACCESSMAP_MODE")? {
            self.routing.mode = mode;
        }
        if let Some(batch_size) = parse_env::<usize>("ACCESSMAP_BATCH_SIZE")? {
            self.routing.batch_size = batch_size;
        }
        if let Some(concurrency) = parse_env::<usize>("ACCESSMAP_CONCURRENCY")? {
            self.routing.concurrency = concurrency;
        }
        if let Ok(host) = env::var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env::<u16>("PORT")? {
            self.server.port = port;
        }
        self.validate()
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let routing = &self.routing;
        if routing.batch_size == 0 {
            return Err(config_error("routing.batch_size must be at least 1", "routing.batch_size"));
        }
        if routing.concurrency == 0 {
            return Err(config_error(
                "routing.concurrency must be at least 1",
                "routing.concurrency",
            ));
        }
        if routing.timeout_ms == 0 {
            return Err(config_error("routing.timeout_ms must be positive", "routing.timeout_ms"));
        }
        let speeds = [
            routing.speeds.walking,
            routing.speeds.cycling,
            routing.speeds.transit,
            routing.speeds.driving,
        ];
        if speeds.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(config_error(
                "routing.speeds must all be positive",
                "routing.speeds",
            ));
        }
        if let Some(max) = routing.max_distance_meters {
            if !max.is_finite() || max <= 0.0 {
                return Err(config_error(
                    "routing.max_distance_meters must be positive",
                    "routing.max_distance_meters",
                ));
            }
        }
        if self.aggregation.chunk_size == 0 || self.aggregation.publish_every == 0 {
            return Err(config_error(
                "aggregation.chunk_size and aggregation.publish_every must be at least 1",
                "aggregation",
            ));
        }
        self.distribution.validate()
    }
}
