use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variables consulted, in order, when no API key is configured.
pub const API_KEY_ENV_VARS: [&str; 3] = ["OPENWEATHER_API_KEY", "WEATHER_API_KEY", "API_KEY"];

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    #[serde(default)]
    pub api: ApiConfig,

    /// Per-service request cadence, retry and cache settings
    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub theme: ThemeConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Unit system requested from the weather service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Imperial,
    Metric,
    Standard,
}

/// How out-of-range fields in a response are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    Strict,
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// OpenWeather API key. Falls back to the environment when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default)]
    pub units: Units,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub validation_mode: ValidationMode,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            units: Units::default(),
            request_timeout_secs: default_request_timeout(),
            validation_mode: ValidationMode::default(),
        }
    }
}

impl ApiConfig {
    /// The configured key, or the first non-empty key found in the environment.
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .filter_map(|name| std::env::var(name).ok())
                    .find(|k| !k.trim().is_empty())
            })
    }
}

/// Settings for one remote service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSettings {
    pub base_url: String,

    /// Minimum spacing between requests, in milliseconds
    pub min_interval_ms: u64,

    /// Total attempts per fetch, including the first
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    pub backoff_multiplier: f64,

    /// Upper bound on any single backoff delay, in milliseconds
    pub max_delay_ms: u64,

    /// How long a validated result stays cached, in seconds
    pub cache_ttl_secs: u64,
}

impl ServiceSettings {
    fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            min_interval_ms: 1000,
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
            cache_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_weather_service")]
    pub weather: ServiceSettings,
    #[serde(default = "default_geocoding_service")]
    pub geocoding: ServiceSettings,
    #[serde(default = "default_geolocation_service")]
    pub geolocation: ServiceSettings,
    /// `cache_ttl_secs` is only the fallback here; sun times stay cached
    /// until the next sunrise or sunset.
    #[serde(default = "default_sun_times_service")]
    pub sun_times: ServiceSettings,
    #[serde(default = "default_historical_service")]
    pub historical: ServiceSettings,
}

fn default_weather_service() -> ServiceSettings {
    ServiceSettings::with_base_url("https://api.openweathermap.org/data/2.5/weather")
}

fn default_geocoding_service() -> ServiceSettings {
    ServiceSettings {
        cache_ttl_secs: 24 * 3600,
        ..ServiceSettings::with_base_url("https://api.openweathermap.org/geo/1.0/direct")
    }
}

fn default_geolocation_service() -> ServiceSettings {
    ServiceSettings::with_base_url("https://ipapi.co/json/")
}

fn default_sun_times_service() -> ServiceSettings {
    ServiceSettings::with_base_url("https://api.sunrise-sunset.org/json")
}

fn default_historical_service() -> ServiceSettings {
    ServiceSettings {
        max_attempts: 5,
        base_delay_ms: 200,
        ..ServiceSettings::with_base_url("https://archive-api.open-meteo.com/v1/archive")
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            weather: default_weather_service(),
            geocoding: default_geocoding_service(),
            geolocation: default_geolocation_service(),
            sun_times: default_sun_times_service(),
            historical: default_historical_service(),
        }
    }
}

impl ServicesConfig {
    fn entries(&self) -> [(&'static str, &ServiceSettings); 5] {
        [
            ("services.weather", &self.weather),
            ("services.geocoding", &self.geocoding),
            ("services.geolocation", &self.geolocation),
            ("services.sun_times", &self.sun_times),
            ("services.historical", &self.historical),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeConfig {
    /// Follow sunrise/sunset instead of the manually chosen theme
    #[serde(default = "default_auto_mode")]
    pub auto_mode: bool,

    #[serde(default = "default_theme_refresh")]
    pub refresh_minutes: u32,

    #[serde(default = "default_light_theme")]
    pub light_theme: String,

    #[serde(default = "default_dark_theme")]
    pub dark_theme: String,

    /// Fixed location for the auto theme. IP geolocation is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

fn default_auto_mode() -> bool {
    true
}

fn default_theme_refresh() -> u32 {
    30
}

fn default_light_theme() -> String {
    "aj_lightly".to_string()
}

fn default_dark_theme() -> String {
    "aj_darkly".to_string()
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            auto_mode: default_auto_mode(),
            refresh_minutes: default_theme_refresh(),
            light_theme: default_light_theme(),
            dark_theme: default_dark_theme(),
            latitude: None,
            longitude: None,
            timezone: None,
        }
    }
}

impl ThemeConfig {
    /// Fixed coordinates, only when both halves are configured.
    pub fn fixed_coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory receiving fetched records
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wxdash")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wxdash");

        Self {
            config_dir,
            api: ApiConfig::default(),
            services: ServicesConfig::default(),
            theme: ThemeConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, writing defaults there if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.api.request_timeout_secs == 0 {
            result.add_error("api.request_timeout_secs", "Request timeout must be positive");
        }

        if self.api.effective_api_key().is_none() {
            result.add_warning(
                "api.api_key",
                format!(
                    "No OpenWeather API key - set api.api_key or one of {}",
                    API_KEY_ENV_VARS.join(", ")
                ),
            );
        }

        for (field, service) in self.services.entries() {
            Self::validate_service(field, service, &mut result);
        }

        if self.theme.refresh_minutes == 0 {
            result.add_error("theme.refresh_minutes", "Theme refresh interval must be positive");
        } else if self.theme.refresh_minutes > 1440 {
            result.add_warning(
                "theme.refresh_minutes",
                "Theme refresh interval is more than 24 hours",
            );
        }

        match (self.theme.latitude, self.theme.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    result.add_error("theme.latitude", "Latitude must be within [-90, 90]");
                }
                if !(-180.0..=180.0).contains(&lon) {
                    result.add_error("theme.longitude", "Longitude must be within [-180, 180]");
                }
            }
            (None, None) => {}
            _ => result.add_warning(
                "theme",
                "Only one of latitude/longitude is set - falling back to IP geolocation",
            ),
        }

        if self.theme.light_theme.trim().is_empty() {
            result.add_error("theme.light_theme", "Theme name cannot be empty");
        }
        if self.theme.dark_theme.trim().is_empty() {
            result.add_error("theme.dark_theme", "Theme name cannot be empty");
        }

        result
    }

    fn validate_service(field: &str, service: &ServiceSettings, result: &mut ValidationResult) {
        Self::validate_url(&service.base_url, &format!("{field}.base_url"), result);

        if service.max_attempts == 0 {
            result.add_error(
                format!("{field}.max_attempts"),
                "Max attempts must be at least 1",
            );
        }

        if !service.backoff_multiplier.is_finite() || service.backoff_multiplier < 1.0 {
            result.add_error(
                format!("{field}.backoff_multiplier"),
                "Backoff multiplier must be a finite number >= 1.0",
            );
        }

        if service.max_delay_ms < service.base_delay_ms {
            result.add_warning(
                format!("{field}.max_delay_ms"),
                "Max delay is below the base delay; every retry waits max_delay_ms",
            );
        }

        if service.cache_ttl_secs == 0 {
            result.add_warning(format!("{field}.cache_ttl_secs"), "Caching disabled (0 seconds)");
        }
    }

    /// Validate a URL field
    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// File receiving fetched records as JSON lines
    pub fn records_path(&self) -> PathBuf {
        self.storage.data_dir.join("records.jsonl")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("wxdash");

        Ok(config_dir.join("config.toml"))
    }
}
