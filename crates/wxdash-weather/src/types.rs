use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit system requested from (and reported by) the weather service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnitSystem {
    /// Fahrenheit, mph
    #[default]
    Imperial,
    /// Celsius, m/s
    Metric,
    /// Kelvin, m/s
    Standard,
}

impl UnitSystem {
    /// Value for the OpenWeather `units` query parameter
    pub fn as_query(&self) -> &'static str {
        match self {
            Self::Imperial => "imperial",
            Self::Metric => "metric",
            Self::Standard => "standard",
        }
    }

    /// Physically plausible temperature range, inclusive.
    pub fn temperature_bounds(&self) -> (f64, f64) {
        match self {
            Self::Imperial => (-76.0, 140.0),
            Self::Metric => (-60.0, 60.0),
            Self::Standard => (213.0, 333.0),
        }
    }

    pub fn max_wind_speed(&self) -> f64 {
        match self {
            Self::Imperial => 450.0,
            Self::Metric | Self::Standard => 200.0,
        }
    }

    pub fn temperature_label(&self) -> &'static str {
        match self {
            Self::Imperial => "°F",
            Self::Metric => "°C",
            Self::Standard => "K",
        }
    }
}

/// Whether a single bad field rejects the whole record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CleanMode {
    /// Any invalid field rejects the record
    Strict,
    /// Invalid optional fields are dropped
    #[default]
    Lenient,
}

/// Remote services reached through the resilient client.
///
/// Each service has its own request cadence, retry budget and cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Weather,
    Geocoding,
    Geolocation,
    SunTimes,
    Historical,
}

impl Service {
    pub const ALL: [Service; 5] = [
        Service::Weather,
        Service::Geocoding,
        Service::Geolocation,
        Service::SunTimes,
        Service::Historical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::Geocoding => "geocoding",
            Self::Geolocation => "geolocation",
            Self::SunTimes => "sun_times",
            Self::Historical => "historical",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical identity of a remote call, used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    service: Service,
    params: String,
}

/// Decimal places kept when coordinates become part of a key
pub const COORDINATE_PRECISION: usize = 2;

impl RequestKey {
    /// Build a key from already-normalized parameters.
    pub fn new(service: Service, params: impl Into<String>) -> Self {
        Self {
            service,
            params: params.into(),
        }
    }

    /// Key for a city query, e.g. `("Phoenix, AZ", Imperial)` -> `phoenix,az,imperial`.
    pub fn city(service: Service, city: &str, units: UnitSystem) -> Self {
        let normalized = city
            .split(',')
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        Self::new(service, format!("{},{}", normalized, units.as_query()))
    }

    /// Key for a coordinate query; coordinates are rounded so nearby points share a key.
    pub fn coordinates(service: Service, latitude: f64, longitude: f64, extra: &str) -> Self {
        let mut params = format!(
            "{:.prec$},{:.prec$}",
            round_coordinate(latitude),
            round_coordinate(longitude),
            prec = COORDINATE_PRECISION
        );
        if !extra.is_empty() {
            params.push(',');
            params.push_str(extra);
        }
        Self::new(service, params)
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}

// Rounds to the key precision; -0.001 and 0.001 share "0.00"
fn round_coordinate(value: f64) -> f64 {
    let factor = 10f64.powi(COORDINATE_PRECISION as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.params)
    }
}

/// A point on the globe with the timezone used for local-date decisions
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Option<Tz>,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            timezone: None,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }
}

/// Weather condition categories mapped from WMO codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Convert WMO weather code to WeatherCondition.
    /// Returns `None` for codes outside the WMO table.
    /// See: https://open-meteo.com/en/docs#weathervariables
    pub fn from_wmo_code(code: i64) -> Option<Self> {
        let condition = match code {
            0 => Self::Clear,
            1..=2 => Self::PartlyCloudy,
            3 => Self::Cloudy,
            45 | 48 => Self::Fog,
            51 | 53 | 55 => Self::Drizzle,
            56 | 57 => Self::Sleet, // Freezing drizzle
            61 | 63 | 80 => Self::Rain,
            65 | 81 | 82 => Self::HeavyRain,
            66 | 67 => Self::Sleet, // Freezing rain
            71 | 73 | 75 | 77 | 85 | 86 => Self::Snow,
            95 | 96 | 99 => Self::Thunderstorm,
            _ => return None,
        };
        Some(condition)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }
}

/// Current conditions for a city.
///
/// Every field is optional: lenient cleaning drops out-of-range values
/// instead of rejecting the record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temperature: Option<f64>,
    pub feels_like: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub description: Option<String>,
    pub observed_at: Option<DateTime<Utc>>,
    pub units: UnitSystem,
}

/// A resolved location, from geocoding or IP geolocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<Tz>,
}

impl LocationPoint {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone,
        }
    }
}

/// Sunrise and sunset for one day at one location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
    /// Seconds of daylight, when reported
    pub day_length: Option<i64>,
}

impl SunTimes {
    /// `sunrise <= now < sunset`
    pub fn is_daytime(&self, now: DateTime<Utc>) -> bool {
        self.sunrise <= now && now < self.sunset
    }

    /// The first sun event strictly after `now`, if any.
    pub fn next_event_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        [self.sunrise, self.sunset]
            .into_iter()
            .filter(|event| *event > now)
            .min()
    }
}

/// One day of archived weather
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayRecord {
    pub date: NaiveDate,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_mean: Option<f64>,
    pub precipitation_sum: Option<f64>,
    pub wind_speed_max: Option<f64>,
    pub humidity_mean: Option<f64>,
    pub condition: Option<WeatherCondition>,
}

/// Daily history for a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub days: Vec<DayRecord>,
}

/// A domain value that passed structural and range validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatedRecord {
    Current(CurrentConditions),
    Location(LocationPoint),
    SunTimes(SunTimes),
    History(HistoricalSeries),
}

impl ValidatedRecord {
    pub fn as_current(&self) -> Option<&CurrentConditions> {
        match self {
            Self::Current(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&LocationPoint> {
        match self {
            Self::Location(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_sun_times(&self) -> Option<&SunTimes> {
        match self {
            Self::SunTimes(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_history(&self) -> Option<&HistoricalSeries> {
        match self {
            Self::History(h) => Some(h),
            _ => None,
        }
    }
}

/// Shape of the payload a request expects; selects the structural
/// check and the cleaning rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// OpenWeather current weather
    CurrentWeather,
    /// OpenWeather direct geocoding (a list of matches)
    CityGeocode,
    /// ipapi.co lookup
    IpLocation,
    /// sunrise-sunset.org with `formatted=0`
    SunTimes,
    /// Open-Meteo archive, daily aggregation
    DailyHistory,
}

impl RecordKind {
    pub fn required_paths(&self) -> &'static [&'static str] {
        match self {
            Self::CurrentWeather => &["name", "main.temp", "weather[0].description"],
            Self::CityGeocode => &["[0].lat", "[0].lon"],
            Self::IpLocation => &["latitude", "longitude"],
            Self::SunTimes => &["status", "results.sunrise", "results.sunset"],
            Self::DailyHistory => &["daily.time"],
        }
    }
}
