//! Builds the weather stack from the loaded configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use wxdash_core::{Config, ServiceSettings, ThemeConfig, Units, ValidationMode};
use wxdash_weather::{
    ChannelPublisher, CleanMode, Clock, Coordinates, DataCleaner, Endpoints, HttpTransport,
    RecordSink, ResilientClient, RetryConfig, Service, ServicePolicy, ThemeDecision,
    ThemeScheduler, TtlPolicy, UnitSystem, WeatherApi,
};

/// Bounds memory when many cities or dates are looked up
const CACHE_CAPACITY: usize = 512;

pub fn unit_system(units: Units) -> UnitSystem {
    match units {
        Units::Imperial => UnitSystem::Imperial,
        Units::Metric => UnitSystem::Metric,
        Units::Standard => UnitSystem::Standard,
    }
}

pub fn clean_mode(mode: ValidationMode) -> CleanMode {
    match mode {
        ValidationMode::Strict => CleanMode::Strict,
        ValidationMode::Lenient => CleanMode::Lenient,
    }
}

pub fn service_policy(service: Service, settings: &ServiceSettings) -> ServicePolicy {
    let cache_ttl = Duration::from_secs(settings.cache_ttl_secs);
    ServicePolicy {
        min_interval: Duration::from_millis(settings.min_interval_ms),
        retry: RetryConfig::new(
            settings.max_attempts,
            settings.base_delay_ms,
            settings.backoff_multiplier,
            settings.max_delay_ms,
        ),
        ttl: match service {
            Service::SunTimes => TtlPolicy::UntilNextSunEvent { fallback: cache_ttl },
            _ => TtlPolicy::Fixed(cache_ttl),
        },
    }
}

fn settings_for(config: &Config, service: Service) -> &ServiceSettings {
    let services = &config.services;
    match service {
        Service::Weather => &services.weather,
        Service::Geocoding => &services.geocoding,
        Service::Geolocation => &services.geolocation,
        Service::SunTimes => &services.sun_times,
        Service::Historical => &services.historical,
    }
}

pub fn build_client(
    config: &Config,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn RecordSink>>,
) -> ResilientClient {
    let cleaner = DataCleaner::new(
        unit_system(config.api.units),
        clean_mode(config.api.validation_mode),
    );
    let mut client = ResilientClient::new(cleaner, clock).with_cache_capacity(CACHE_CAPACITY);
    for service in Service::ALL {
        client = client.with_policy(service, service_policy(service, settings_for(config, service)));
    }
    match sink {
        Some(sink) => client.with_sink(sink),
        None => client,
    }
}

pub fn endpoints(config: &Config) -> Endpoints {
    Endpoints {
        weather: config.services.weather.base_url.clone(),
        geocoding: config.services.geocoding.base_url.clone(),
        geolocation: config.services.geolocation.base_url.clone(),
        sun_times: config.services.sun_times.base_url.clone(),
        historical: config.services.historical.base_url.clone(),
    }
}

pub fn build_api(config: &Config, client: Arc<ResilientClient>) -> Result<WeatherApi<HttpTransport>> {
    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    Ok(WeatherApi::new(client, transport)
        .with_endpoints(endpoints(config))
        .with_api_key(config.api.effective_api_key())
        .with_timeout(Duration::from_secs(config.api.request_timeout_secs)))
}

/// Configured location for the auto theme, if any.
pub fn theme_coordinates(theme: &ThemeConfig) -> Option<Coordinates> {
    let (latitude, longitude) = theme.fixed_coordinates()?;
    let coordinates = Coordinates::new(latitude, longitude);
    match theme.timezone.as_deref().map(str::parse::<chrono_tz::Tz>) {
        Some(Ok(tz)) => Some(coordinates.with_timezone(tz)),
        Some(Err(_)) => {
            tracing::warn!(
                "Unknown theme.timezone {:?}, estimating local dates from longitude",
                theme.timezone
            );
            Some(coordinates)
        }
        None => Some(coordinates),
    }
}

pub fn build_scheduler(
    config: &Config,
    api: Arc<WeatherApi<HttpTransport>>,
    decisions: std::sync::mpsc::Sender<ThemeDecision>,
) -> ThemeScheduler<HttpTransport> {
    let refresh = Duration::from_secs(u64::from(config.theme.refresh_minutes.max(1)) * 60);
    ThemeScheduler::new(api, Arc::new(ChannelPublisher::new(decisions)))
        .with_refresh_interval(refresh)
        .with_coordinates(theme_coordinates(&config.theme))
        .with_auto_mode(config.theme.auto_mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wxdash_weather::SystemClock;

    #[test]
    fn test_sun_times_expire_at_next_event() {
        let config = Config::default();
        let policy = service_policy(Service::SunTimes, &config.services.sun_times);
        assert_eq!(
            policy.ttl,
            TtlPolicy::UntilNextSunEvent {
                fallback: Duration::from_secs(3600)
            }
        );
        let policy = service_policy(Service::Geocoding, &config.services.geocoding);
        assert_eq!(policy.ttl, TtlPolicy::Fixed(Duration::from_secs(24 * 3600)));
    }

    #[test]
    fn test_historical_retry_budget() {
        let config = Config::default();
        let policy = service_policy(Service::Historical, &config.services.historical);
        assert_eq!(policy.retry.max_attempts, 5);
        assert_eq!(policy.retry.base_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_client_uses_configured_policies() {
        let mut config = Config::default();
        config.services.weather.min_interval_ms = 2500;
        config.api.validation_mode = ValidationMode::Strict;
        config.api.units = Units::Metric;

        let client = build_client(&config, Arc::new(SystemClock), None);
        assert_eq!(
            client.policy(Service::Weather).min_interval,
            Duration::from_millis(2500)
        );
        assert_eq!(client.cleaner().mode(), CleanMode::Strict);
        assert_eq!(client.cleaner().units(), UnitSystem::Metric);
    }

    #[test]
    fn test_theme_coordinates() {
        let mut theme = ThemeConfig::default();
        assert_eq!(theme_coordinates(&theme), None);

        theme.latitude = Some(33.45);
        theme.longitude = Some(-112.07);
        theme.timezone = Some("America/Phoenix".to_string());
        let at = theme_coordinates(&theme);
        assert_eq!(at.and_then(|c| c.timezone), Some(chrono_tz::America::Phoenix));

        theme.timezone = Some("Nowhere/Special".to_string());
        let at = theme_coordinates(&theme);
        assert_eq!(at.map(|c| c.latitude), Some(33.45));
        assert_eq!(at.and_then(|c| c.timezone), None);
    }

    #[test]
    fn test_endpoints_follow_config() {
        let mut config = Config::default();
        config.services.geolocation.base_url = "http://localhost:8080/json/".to_string();
        assert_eq!(endpoints(&config).geolocation, "http://localhost:8080/json/");
        assert_eq!(endpoints(&config).weather, wxdash_weather::api::OPENWEATHER_URL);
    }
}
