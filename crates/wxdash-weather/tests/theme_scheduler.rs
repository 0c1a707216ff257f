//! Day/night decisions driven through the weather API.
#![allow(clippy::unwrap_used)]

mod common;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::*;
use wxdash_weather::theme::Phase;
use wxdash_weather::{
    CleanMode, Coordinates, Endpoints, ManualClock, SchedulerEvent, ThemeDecision,
    ThemePublisher, ThemeScheduler, UnitSystem, WeatherApi,
};

#[derive(Default)]
struct Recorder {
    published: Mutex<Vec<ThemeDecision>>,
}

impl ThemePublisher for Recorder {
    fn publish(&self, decision: &ThemeDecision) {
        self.published.lock().push(decision.clone());
    }
}

struct Fixture {
    clock: Arc<ManualClock>,
    transport: Arc<ScriptedTransport>,
    recorder: Arc<Recorder>,
    scheduler: Arc<ThemeScheduler<Arc<ScriptedTransport>>>,
    endpoints: Endpoints,
}

fn phoenix() -> Coordinates {
    Coordinates::new(33.4484, -112.074).with_timezone(chrono_tz::America::Phoenix)
}

/// Scheduler with the Phoenix sun table, clock at `hour:00` UTC on `day` June 2026.
fn fixture(day: u32, hour: u32, coordinates: Option<Coordinates>) -> Fixture {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 6, day, hour, 0, 0).unwrap(),
    ));
    let transport = ScriptedTransport::new();
    let endpoints = Endpoints::all_at(BASE);
    transport.reply_json(&endpoints.sun_times, phoenix_sun());
    transport.reply_json(&endpoints.geolocation, phoenix_ip());

    let client = Arc::new(client(UnitSystem::Imperial, CleanMode::Strict, clock.clone()));
    let api = Arc::new(WeatherApi::new(client, transport.clone()).with_endpoints(endpoints.clone()));
    let recorder = Arc::new(Recorder::default());
    let scheduler = Arc::new(
        ThemeScheduler::new(api, recorder.clone())
            .with_coordinates(coordinates)
            .with_refresh_interval(Duration::from_secs(60)),
    );

    Fixture {
        clock,
        transport,
        recorder,
        scheduler,
        endpoints,
    }
}

#[tokio::test(start_paused = true)]
async fn test_nine_pm_local_is_night() {
    // 21:00 in Phoenix
    let fx = fixture(2, 4, Some(phoenix()));
    let decision = fx.scheduler.refresh().await.unwrap();

    assert!(!decision.is_daytime);
    assert_eq!(fx.scheduler.recommended_theme("aj_lightly", "aj_darkly"), "aj_darkly");
    assert_eq!(fx.transport.calls_to(&fx.endpoints.geolocation), 0);
}

#[tokio::test(start_paused = true)]
async fn test_noon_local_is_day() {
    // 12:00 in Phoenix
    let fx = fixture(1, 19, Some(phoenix()));
    let decision = fx.scheduler.refresh().await.unwrap();

    assert!(decision.is_daytime);
    assert_eq!(decision.sunrise, Some(Utc.with_ymd_and_hms(2026, 6, 1, 13, 0, 0).unwrap()));
    assert_eq!(fx.scheduler.recommended_theme("aj_lightly", "aj_darkly"), "aj_lightly");
    assert_eq!(fx.recorder.published.lock().len(), 1);
    assert_eq!(fx.scheduler.phase(), Phase::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_ip_geolocation_without_coordinates() {
    let fx = fixture(1, 19, None);
    let decision = fx.scheduler.refresh().await.unwrap();

    assert!(decision.is_daytime);
    assert_eq!(fx.transport.calls_to(&fx.endpoints.geolocation), 1);
    let location = decision.location.unwrap();
    assert_eq!(location.timezone, Some(chrono_tz::America::Phoenix));
}

#[tokio::test(start_paused = true)]
async fn test_failure_keeps_previous_decision() {
    let fx = fixture(1, 19, Some(phoenix()));
    let day = fx.scheduler.refresh().await.unwrap();
    assert!(day.is_daytime);

    // Next local day is not cached yet and the service is down
    fx.transport.reset(&fx.endpoints.sun_times);
    fx.transport.reply_status(&fx.endpoints.sun_times, 503);
    fx.clock.advance(Duration::from_secs(24 * 3600));

    assert!(fx.scheduler.refresh().await.is_err());
    assert_eq!(fx.scheduler.current(), day);
    assert_eq!(fx.recorder.published.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_starts_dark_before_first_refresh() {
    let fx = fixture(1, 19, Some(phoenix()));
    assert!(!fx.scheduler.current().is_daytime);
}

#[tokio::test(start_paused = true)]
async fn test_auto_mode_off_suppresses_publish() {
    let fx = fixture(1, 19, Some(phoenix()));
    let scheduler = fx.scheduler.clone();
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let cancel = CancellationToken::new();

    tx.send(SchedulerEvent::SetAutoMode(false)).await.unwrap();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(rx, cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(!fx.scheduler.auto_mode());
    assert!(fx.scheduler.current().is_daytime);
    assert!(fx.recorder.published.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_refreshes_on_tick_and_location_change() {
    let fx = fixture(1, 19, None);
    let scheduler = fx.scheduler.clone();
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(rx, cancel).await }
    });

    // Immediate first tick uses IP geolocation
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.recorder.published.lock().len(), 1);

    tx.send(SchedulerEvent::LocationChanged(Some(phoenix()))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.recorder.published.lock().len(), 2);

    // Next periodic tick
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fx.recorder.published.lock().len(), 3);

    cancel.cancel();
    handle.await.unwrap();
    assert_eq!(fx.transport.calls_to(&fx.endpoints.geolocation), 1);
}

#[tokio::test(start_paused = true)]
async fn test_morning_without_timezone_uses_location_date() {
    // 08:00 on 2 June in Tokyo, still 1 June in UTC
    let tokyo = Coordinates::new(35.68, 139.69);
    let fx = fixture(1, 23, Some(tokyo));
    fx.transport.reset(&fx.endpoints.sun_times);
    fx.transport.reply_json(&fx.endpoints.sun_times, tokyo_sun());

    let decision = fx.scheduler.refresh().await.unwrap();

    assert_eq!(
        fx.transport.last_param(&fx.endpoints.sun_times, "date").as_deref(),
        Some("2026-06-02")
    );
    assert!(decision.is_daytime);
    assert_eq!(fx.scheduler.recommended_theme("aj_lightly", "aj_darkly"), "aj_lightly");
}
