//! Field extraction, type coercion and range validation.
//!
//! Every field is checked independently. In strict mode any invalid field
//! rejects the record; in lenient mode invalid optional fields are dropped.
//! Essential fields (a location's coordinates, sunrise and sunset) reject
//! the record in both modes.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::types::{
    CleanMode, CurrentConditions, DayRecord, HistoricalSeries, LocationPoint, RecordKind,
    SunTimes, UnitSystem, ValidatedRecord, WeatherCondition,
};
use crate::validate::lookup;

/// Longest string kept from a response, in characters
pub const MAX_TEXT_LEN: usize = 128;

pub const HUMIDITY_RANGE: (f64, f64) = (0.0, 100.0);
/// Sea-level-adjusted pressure, hPa
pub const PRESSURE_RANGE: (f64, f64) = (870.0, 1085.0);
pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);

/// One rejected field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub path: String,
    pub reason: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid field(s): {}", summary(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn summary(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Paths of every failing field
    pub fn fields(&self) -> Vec<&str> {
        self.issues.iter().map(|i| i.path.as_str()).collect()
    }

    pub fn names(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

/// Collects field values and the problems found while reading them.
struct Fields<'a> {
    raw: &'a Value,
    issues: Vec<FieldIssue>,
    essential_failed: bool,
}

impl<'a> Fields<'a> {
    fn new(raw: &'a Value) -> Self {
        Self {
            raw,
            issues: Vec::new(),
            essential_failed: false,
        }
    }

    fn reject(&mut self, path: &str, reason: impl Into<String>) {
        self.issues.push(FieldIssue {
            path: path.to_string(),
            reason: reason.into(),
        });
    }

    /// Numeric field, accepting JSON numbers and numeric strings.
    /// Absent fields are not an issue.
    fn number(&mut self, path: &str, range: Option<(f64, f64)>) -> Option<f64> {
        let value = lookup(self.raw, path)?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        let Some(number) = parsed else {
            self.reject(path, format!("not a number: {}", value));
            return None;
        };
        if !number.is_finite() {
            self.reject(path, "not a finite number");
            return None;
        }
        if let Some((min, max)) = range {
            if !(min..=max).contains(&number) {
                self.reject(path, format!("{} out of range [{}, {}]", number, min, max));
                return None;
            }
        }
        Some(number)
    }

    /// Text field: trimmed, non-empty, capped at `MAX_TEXT_LEN` characters.
    fn text(&mut self, path: &str) -> Option<String> {
        let value = lookup(self.raw, path)?;
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                self.reject(path, "not a string");
                return None;
            }
        };
        if text.is_empty() {
            self.reject(path, "empty");
            return None;
        }
        Some(text.chars().take(MAX_TEXT_LEN).collect())
    }

    fn unix_time(&mut self, path: &str) -> Option<DateTime<Utc>> {
        let seconds = self.number(path, Some((0.0, i64::MAX as f64)))?;
        let parsed = DateTime::from_timestamp(seconds as i64, 0);
        if parsed.is_none() {
            self.reject(path, "timestamp out of range");
        }
        parsed
    }

    fn rfc3339(&mut self, path: &str) -> Option<DateTime<Utc>> {
        let text = self.text(path)?;
        match DateTime::parse_from_rfc3339(&text) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(e) => {
                self.reject(path, format!("not an RFC 3339 time: {}", e));
                None
            }
        }
    }

    fn date(&mut self, path: &str) -> Option<NaiveDate> {
        let text = self.text(path)?;
        match NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                self.reject(path, format!("not a YYYY-MM-DD date: {}", text));
                None
            }
        }
    }

    fn timezone(&mut self, path: &str) -> Option<Tz> {
        let name = self.text(path)?;
        match name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                self.reject(path, format!("unknown timezone: {}", name));
                None
            }
        }
    }

    fn condition(&mut self, path: &str) -> Option<WeatherCondition> {
        let code = self.number(path, None)?;
        let condition = WeatherCondition::from_wmo_code(code as i64);
        if condition.is_none() {
            self.reject(path, format!("unknown WMO code: {}", code));
        }
        condition
    }

    /// Mark a field the record cannot exist without.
    fn essential<T>(&mut self, path: &str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            if !self.issues.iter().any(|i| i.path == path) {
                self.reject(path, "required");
            }
            self.essential_failed = true;
        }
        value
    }

    fn finish<T>(self, mode: CleanMode, record: Option<T>) -> Result<T, ValidationError> {
        let rejected = self.essential_failed || (mode == CleanMode::Strict && !self.issues.is_empty());
        match record {
            Some(record) if !rejected => {
                if !self.issues.is_empty() {
                    tracing::warn!("Dropped invalid field(s): {}", summary(&self.issues));
                }
                Ok(record)
            }
            _ => {
                tracing::warn!("Record rejected: {}", summary(&self.issues));
                Err(ValidationError {
                    issues: self.issues,
                })
            }
        }
    }
}

/// Turns structurally valid JSON into a `ValidatedRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataCleaner {
    units: UnitSystem,
    mode: CleanMode,
}

impl DataCleaner {
    pub fn new(units: UnitSystem, mode: CleanMode) -> Self {
        Self { units, mode }
    }

    pub fn units(&self) -> UnitSystem {
        self.units
    }

    pub fn mode(&self) -> CleanMode {
        self.mode
    }

    /// # Errors
    /// `ValidationError` naming every failing field when the record is
    /// rejected (strict mode, or an essential field is invalid).
    pub fn clean(&self, raw: &Value, kind: RecordKind) -> Result<ValidatedRecord, ValidationError> {
        match kind {
            RecordKind::CurrentWeather => self.current(raw).map(ValidatedRecord::Current),
            RecordKind::CityGeocode => self.location(raw, "[0].").map(ValidatedRecord::Location),
            RecordKind::IpLocation => self.location(raw, "").map(ValidatedRecord::Location),
            RecordKind::SunTimes => self.sun_times(raw).map(ValidatedRecord::SunTimes),
            RecordKind::DailyHistory => self.history(raw).map(ValidatedRecord::History),
        }
    }

    fn current(&self, raw: &Value) -> Result<CurrentConditions, ValidationError> {
        let temperature = Some(self.units.temperature_bounds());
        let wind = Some((0.0, self.units.max_wind_speed()));
        let mut f = Fields::new(raw);

        let record = CurrentConditions {
            city: f.text("name"),
            country: f.text("sys.country"),
            latitude: f.number("coord.lat", Some(LATITUDE_RANGE)),
            longitude: f.number("coord.lon", Some(LONGITUDE_RANGE)),
            temperature: f.number("main.temp", temperature),
            feels_like: f.number("main.feels_like", temperature),
            humidity: f.number("main.humidity", Some(HUMIDITY_RANGE)),
            pressure: f.number("main.pressure", Some(PRESSURE_RANGE)),
            wind_speed: f.number("wind.speed", wind),
            description: f.text("weather[0].description"),
            observed_at: f.unix_time("dt"),
            units: self.units,
        };
        f.finish(self.mode, Some(record))
    }

    /// Geocoding and IP lookups share one shape; `prefix` selects the
    /// first match of a geocoding list.
    fn location(&self, raw: &Value, prefix: &str) -> Result<LocationPoint, ValidationError> {
        let path = |field: &str| format!("{}{}", prefix, field);
        let (lat_field, lon_field, region_field, country_field) = if prefix.is_empty() {
            ("latitude", "longitude", "region", "country_name")
        } else {
            ("lat", "lon", "state", "country")
        };
        let mut f = Fields::new(raw);

        let latitude = f.number(&path(lat_field), Some(LATITUDE_RANGE));
        let latitude = f.essential(&path(lat_field), latitude);
        let longitude = f.number(&path(lon_field), Some(LONGITUDE_RANGE));
        let longitude = f.essential(&path(lon_field), longitude);
        let city = f.text(&path(if prefix.is_empty() { "city" } else { "name" }));
        let region = f.text(&path(region_field));
        let country = f.text(&path(country_field));
        let timezone = if prefix.is_empty() {
            f.timezone("timezone")
        } else {
            None
        };

        let record = latitude.zip(longitude).map(|(latitude, longitude)| LocationPoint {
            latitude,
            longitude,
            city,
            region,
            country,
            timezone,
        });
        f.finish(self.mode, record)
    }

    fn sun_times(&self, raw: &Value) -> Result<SunTimes, ValidationError> {
        let mut f = Fields::new(raw);

        let status = f.text("status");
        let status = f.essential("status", status);
        if let Some(status) = status.as_deref().filter(|s| *s != "OK") {
            f.reject("status", format!("service reported {}", status));
            f.essential_failed = true;
        }
        let sunrise = f.rfc3339("results.sunrise");
        let sunrise = f.essential("results.sunrise", sunrise);
        let sunset = f.rfc3339("results.sunset");
        let sunset = f.essential("results.sunset", sunset);
        let day_length = f
            .number("results.day_length", Some((0.0, 86_400.0)))
            .map(|s| s as i64);

        if let (Some(rise), Some(set)) = (sunrise, sunset) {
            if set <= rise {
                // Polar day/night: the service returns placeholder times
                f.reject("results.sunset", "sunset is not after sunrise");
                f.essential_failed = true;
            }
        }

        let record = sunrise.zip(sunset).map(|(sunrise, sunset)| SunTimes {
            sunrise,
            sunset,
            day_length,
        });
        f.finish(self.mode, record)
    }

    fn history(&self, raw: &Value) -> Result<HistoricalSeries, ValidationError> {
        // Open-Meteo has no kelvin; history is requested in °C for that system
        let units = match self.units {
            UnitSystem::Standard => UnitSystem::Metric,
            other => other,
        };
        let temperature = Some(units.temperature_bounds());
        let wind = Some((0.0, units.max_wind_speed()));
        let mut f = Fields::new(raw);

        let day_count = lookup(raw, "daily.time")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        let mut days = Vec::with_capacity(day_count);
        for i in 0..day_count {
            let at = |series: &str| format!("daily.{}[{}]", series, i);
            let Some(date) = f.date(&at("time")) else {
                continue;
            };
            days.push(DayRecord {
                date,
                temp_max: f.number(&at("temperature_2m_max"), temperature),
                temp_min: f.number(&at("temperature_2m_min"), temperature),
                temp_mean: f.number(&at("temperature_2m_mean"), temperature),
                precipitation_sum: f.number(&at("precipitation_sum"), Some((0.0, f64::MAX))),
                wind_speed_max: f.number(&at("wind_speed_10m_max"), wind),
                humidity_mean: f.number(&at("relative_humidity_2m_mean"), Some(HUMIDITY_RANGE)),
                condition: f.condition(&at("weather_code")),
            });
        }

        let record = HistoricalSeries {
            latitude: f.number("latitude", Some(LATITUDE_RANGE)),
            longitude: f.number("longitude", Some(LONGITUDE_RANGE)),
            days,
        };
        f.finish(self.mode, Some(record))
    }
}
