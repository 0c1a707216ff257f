//! Weather-fetch call sites.
//!
//! Each method builds the request key, URL and expected payload for one
//! remote service and routes the call through the shared `ResilientClient`.

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{FetchError, FetchRequest, ResilientClient};
use crate::transport::{Transport, TransportRequest, DEFAULT_TIMEOUT_SECS};
use crate::types::{
    Coordinates, CurrentConditions, HistoricalSeries, LocationPoint, RecordKind, RequestKey,
    Service, SunTimes, UnitSystem, ValidatedRecord,
};
use crate::validate::StructuralError;

pub const OPENWEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const GEOCODING_URL: &str = "https://api.openweathermap.org/geo/1.0/direct";
pub const GEOLOCATION_URL: &str = "https://ipapi.co/json/";
pub const SUN_TIMES_URL: &str = "https://api.sunrise-sunset.org/json";
pub const HISTORICAL_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Daily series requested from the archive
const DAILY_SERIES: &str = "temperature_2m_max,temperature_2m_min,temperature_2m_mean,\
precipitation_sum,wind_speed_10m_max,relative_humidity_2m_mean,weather_code";

/// Base URLs of the remote services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub weather: String,
    pub geocoding: String,
    pub geolocation: String,
    pub sun_times: String,
    pub historical: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            weather: OPENWEATHER_URL.to_string(),
            geocoding: GEOCODING_URL.to_string(),
            geolocation: GEOLOCATION_URL.to_string(),
            sun_times: SUN_TIMES_URL.to_string(),
            historical: HISTORICAL_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Every service under one base URL (mock servers).
    pub fn all_at(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            weather: format!("{}/data/2.5/weather", base),
            geocoding: format!("{}/geo/1.0/direct", base),
            geolocation: format!("{}/json/", base),
            sun_times: format!("{}/sun/json", base),
            historical: format!("{}/v1/archive", base),
        }
    }
}

pub struct WeatherApi<T> {
    client: Arc<ResilientClient>,
    transport: T,
    endpoints: Endpoints,
    api_key: Option<String>,
    units: UnitSystem,
    timeout: Duration,
}

impl<T> std::fmt::Debug for WeatherApi<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherApi")
            .field("endpoints", &self.endpoints)
            .field("has_api_key", &self.api_key.is_some())
            .field("units", &self.units)
            .finish()
    }
}

impl<T: Transport> WeatherApi<T> {
    pub fn new(client: Arc<ResilientClient>, transport: T) -> Self {
        let units = client.cleaner().units();
        Self {
            client,
            transport,
            endpoints: Endpoints::default(),
            api_key: None,
            units,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn units(&self) -> UnitSystem {
        self.units
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    fn request(&self, url: &str) -> TransportRequest {
        TransportRequest::new(url).timeout(self.timeout)
    }

    fn openweather(&self, url: &str) -> TransportRequest {
        let request = self.request(url);
        match &self.api_key {
            Some(key) => request.param("appid", key),
            None => {
                tracing::warn!("No OpenWeather API key configured");
                request
            }
        }
    }

    /// Current weather for a city: geocode it, then query by coordinates.
    pub async fn current_weather(&self, city: &str) -> Result<CurrentConditions, FetchError> {
        let location = self.geocode_city(city).await?;
        let mut current = self.current_weather_at(location.coordinates()).await?;
        // Prefer the name the user searched for over the station name
        if let Some(name) = location.city {
            current.city = Some(name);
        }
        Ok(current)
    }

    pub async fn current_weather_at(&self, at: Coordinates) -> Result<CurrentConditions, FetchError> {
        let request = FetchRequest::new(
            RequestKey::coordinates(Service::Weather, at.latitude, at.longitude, self.units.as_query()),
            RecordKind::CurrentWeather,
            self.openweather(&self.endpoints.weather)
                .param("lat", at.latitude)
                .param("lon", at.longitude)
                .param("units", self.units.as_query()),
        );
        let record = self.client.fetch(&request, &self.transport).await?;
        extract(&record, ValidatedRecord::as_current)
    }

    /// First geocoding match for `city`.
    pub async fn geocode_city(&self, city: &str) -> Result<LocationPoint, FetchError> {
        let request = FetchRequest::new(
            RequestKey::city(Service::Geocoding, city, self.units),
            RecordKind::CityGeocode,
            self.openweather(&self.endpoints.geocoding)
                .param("q", city.trim())
                .param("limit", 1),
        );
        let record = self
            .client
            .fetch(&request, &self.transport)
            .await
            .map_err(|e| no_match_as_not_found(e, city))?;
        extract(&record, ValidatedRecord::as_location)
    }

    /// Approximate location of this machine's public IP.
    pub async fn ip_location(&self) -> Result<LocationPoint, FetchError> {
        let request = FetchRequest::new(
            RequestKey::new(Service::Geolocation, "self"),
            RecordKind::IpLocation,
            self.request(&self.endpoints.geolocation),
        );
        let record = self.client.fetch(&request, &self.transport).await?;
        extract(&record, ValidatedRecord::as_location)
    }

    /// Sunrise and sunset on `date` at `at`, in UTC.
    pub async fn sun_times(&self, at: Coordinates, date: NaiveDate) -> Result<SunTimes, FetchError> {
        let date = date.format("%Y-%m-%d").to_string();
        let request = FetchRequest::new(
            RequestKey::coordinates(Service::SunTimes, at.latitude, at.longitude, &date),
            RecordKind::SunTimes,
            self.request(&self.endpoints.sun_times)
                .param("lat", at.latitude)
                .param("lng", at.longitude)
                .param("date", &date)
                .param("formatted", 0),
        );
        let record = self.client.fetch(&request, &self.transport).await?;
        extract(&record, ValidatedRecord::as_sun_times)
    }

    /// Daily history between two dates, inclusive.
    pub async fn historical(
        &self,
        at: Coordinates,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HistoricalSeries, FetchError> {
        let (temperature_unit, wind_speed_unit) = match self.units {
            UnitSystem::Imperial => ("fahrenheit", "mph"),
            UnitSystem::Metric | UnitSystem::Standard => ("celsius", "ms"),
        };
        let range = format!("{}..{},{}", start, end, temperature_unit);
        let request = FetchRequest::new(
            RequestKey::coordinates(Service::Historical, at.latitude, at.longitude, &range),
            RecordKind::DailyHistory,
            self.request(&self.endpoints.historical)
                .param("latitude", at.latitude)
                .param("longitude", at.longitude)
                .param("start_date", start)
                .param("end_date", end)
                .param("daily", DAILY_SERIES)
                .param("temperature_unit", temperature_unit)
                .param("wind_speed_unit", wind_speed_unit)
                .param("timezone", "auto"),
        );
        let record = self.client.fetch(&request, &self.transport).await?;
        extract(&record, ValidatedRecord::as_history)
    }
}

// Geocoding answers an unknown city with `[]`, which fails every `[0].` path
fn no_match_as_not_found(error: FetchError, city: &str) -> FetchError {
    match error {
        FetchError::Structural(StructuralError::Missing(paths))
            if paths.iter().all(|path| path.starts_with("[0].")) =>
        {
            FetchError::NotFound(city.trim().to_string())
        }
        other => other,
    }
}

fn extract<V: Clone>(
    record: &ValidatedRecord,
    pick: impl Fn(&ValidatedRecord) -> Option<&V>,
) -> Result<V, FetchError> {
    pick(record).cloned().ok_or_else(|| {
        FetchError::Structural(StructuralError::Malformed(
            "cached record has an unexpected kind".to_string(),
        ))
    })
}
