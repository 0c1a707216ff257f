//! Fetches started from a plain (UI) thread and delivered over std mpsc.
#![allow(clippy::unwrap_used, clippy::panic)]

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use wxdash_weather::service::{request_fetch, request_local_fetch, WeatherServiceMessage};
use wxdash_weather::{CleanMode, Coordinates, Endpoints, SystemClock, UnitSystem, WeatherApi};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn api(transport: Arc<ScriptedTransport>) -> Arc<WeatherApi<Arc<ScriptedTransport>>> {
    let client = Arc::new(client(UnitSystem::Imperial, CleanMode::Lenient, Arc::new(SystemClock)));
    Arc::new(WeatherApi::new(client, transport).with_endpoints(Endpoints::all_at(BASE)))
}

#[test]
fn test_city_fetch_result_arrives_on_channel() {
    let endpoints = Endpoints::all_at(BASE);
    let transport = ScriptedTransport::new();
    transport.reply_json(&endpoints.geocoding, phoenix_geocode());
    transport.reply_json(&endpoints.weather, phoenix_weather(112.0));

    let runtime = runtime();
    let (tx, rx) = mpsc::channel();
    request_fetch(runtime.handle(), &tx, api(transport), "Phoenix,AZ".to_string());

    match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        WeatherServiceMessage::FetchDone { city, result } => {
            assert_eq!(city, "Phoenix,AZ");
            assert_eq!(result.unwrap().temperature, Some(112.0));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[test]
fn test_city_fetch_error_arrives_on_channel() {
    let endpoints = Endpoints::all_at(BASE);
    let transport = ScriptedTransport::new();
    transport.reply_status(&endpoints.geocoding, 401);

    let runtime = runtime();
    let (tx, rx) = mpsc::channel();
    request_fetch(runtime.handle(), &tx, api(transport), "Phoenix".to_string());

    match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        WeatherServiceMessage::FetchDone { result: Err(e), .. } => {
            assert!(e.user_message().contains("API key"));
        }
        other => panic!("unexpected message {:?}", other),
    }
}

#[test]
fn test_local_fetch_uses_ip_location_when_no_coordinates() {
    let endpoints = Endpoints::all_at(BASE);
    let transport = ScriptedTransport::new();
    transport.reply_json(&endpoints.geolocation, phoenix_ip());
    transport.reply_json(&endpoints.weather, phoenix_weather(100.0));

    let runtime = runtime();
    let (tx, rx) = mpsc::channel();
    request_local_fetch(runtime.handle(), &tx, api(transport.clone()), None);

    match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
        WeatherServiceMessage::LocalFetchDone(result) => {
            assert_eq!(result.unwrap().temperature, Some(100.0));
        }
        other => panic!("unexpected message {:?}", other),
    }
    assert_eq!(transport.calls_to(&endpoints.geolocation), 1);

    let (tx, rx) = mpsc::channel();
    request_local_fetch(
        runtime.handle(),
        &tx,
        api(transport.clone()),
        Some(Coordinates::new(40.0, -105.0)),
    );
    assert!(matches!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        WeatherServiceMessage::LocalFetchDone(Ok(_))
    ));
    assert_eq!(transport.calls_to(&endpoints.geolocation), 1);
}
