//! Shared fixtures: a scripted transport and canned payloads.
#![allow(dead_code, clippy::unwrap_used)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wxdash_weather::{
    CleanMode, Clock, DataCleaner, RawResponse, ResilientClient, RetryConfig, Service,
    ServicePolicy, Transport, TransportError, TransportRequest, TtlPolicy, UnitSystem,
};

pub const BASE: &str = "http://stub";

type Reply = Result<RawResponse, TransportError>;

/// Replies per URL in order; the last reply repeats.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, Vec<Reply>>>,
    calls: Mutex<Vec<(String, tokio::time::Instant)>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, url: &str, reply: Reply) {
        self.replies.lock().entry(url.to_string()).or_default().push(reply);
    }

    pub fn reply_json(&self, url: &str, body: Value) {
        self.reply(url, Ok(ok(body)));
    }

    pub fn reply_status(&self, url: &str, status: u16) {
        self.reply(
            url,
            Err(TransportError::Status {
                status,
                retry_after: None,
                message: String::new(),
            }),
        );
    }

    /// Replace everything scripted for `url`.
    pub fn reset(&self, url: &str) {
        self.replies.lock().remove(url);
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|(u, _)| u == url).count()
    }

    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.calls.lock().iter().map(|(_, at)| *at).collect()
    }

    /// Value of query parameter `name` on the most recent call to `url`.
    pub fn last_param(&self, url: &str, name: &str) -> Option<String> {
        let requests = self.requests.lock();
        let request = requests.iter().rev().find(|r| r.url == url)?;
        request
            .query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }
}

impl Transport for ScriptedTransport {
    async fn get(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        self.calls
            .lock()
            .push((request.url.clone(), tokio::time::Instant::now()));
        self.requests.lock().push(request.clone());
        let mut replies = self.replies.lock();
        match replies.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(TransportError::Status {
                status: 404,
                retry_after: None,
                message: format!("no script for {}", request.url),
            }),
        }
    }
}

pub fn ok(body: Value) -> RawResponse {
    RawResponse {
        status: 200,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

/// Fast policies: no spacing, quick retries.
pub fn quick_policy(max_attempts: u32) -> ServicePolicy {
    ServicePolicy {
        min_interval: Duration::ZERO,
        retry: RetryConfig::new(max_attempts, 100, 2.0, 1000),
        ttl: TtlPolicy::Fixed(Duration::from_secs(3600)),
    }
}

pub fn client(units: UnitSystem, mode: CleanMode, clock: Arc<dyn Clock>) -> ResilientClient {
    let mut client = ResilientClient::new(DataCleaner::new(units, mode), clock);
    for service in Service::ALL {
        client = client.with_policy(service, quick_policy(3));
    }
    client
}

pub fn phoenix_weather(temp: f64) -> Value {
    json!({
        "coord": {"lon": -112.07, "lat": 33.45},
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky"}],
        "main": {"temp": temp, "feels_like": 120.0, "humidity": 6, "pressure": 1006},
        "wind": {"speed": 9.2},
        "dt": 1_782_000_000,
        "sys": {"country": "US"},
        "name": "Phoenix"
    })
}

pub fn phoenix_geocode() -> Value {
    json!([{
        "name": "Phoenix",
        "lat": 33.4484,
        "lon": -112.074,
        "country": "US",
        "state": "Arizona"
    }])
}

pub fn phoenix_ip() -> Value {
    json!({
        "ip": "203.0.113.7",
        "city": "Phoenix",
        "region": "Arizona",
        "country_name": "United States",
        "latitude": 33.4484,
        "longitude": -112.074,
        "timezone": "America/Phoenix"
    })
}

/// Phoenix on 2026-06-01: sunrise 06:00, sunset 20:00 local (UTC-7).
pub fn phoenix_sun() -> Value {
    json!({
        "status": "OK",
        "results": {
            "sunrise": "2026-06-01T13:00:00+00:00",
            "sunset": "2026-06-02T03:00:00+00:00",
            "day_length": 50400
        },
        "tzid": "UTC"
    })
}

/// Tokyo on 2026-06-02: sunrise 04:30, sunset 19:00 local (UTC+9).
pub fn tokyo_sun() -> Value {
    json!({
        "status": "OK",
        "results": {
            "sunrise": "2026-06-01T19:30:00+00:00",
            "sunset": "2026-06-02T10:00:00+00:00",
            "day_length": 52200
        },
        "tzid": "UTC"
    })
}
