//! Automatic light/dark theme scheduling.
//!
//! The scheduler resolves a location (explicit coordinates, else IP
//! geolocation), fetches sun times for the location-local date and decides
//! whether it is daytime. Failures keep the previous decision in force.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::WeatherApi;
use crate::client::FetchError;
use crate::transport::Transport;
use crate::types::Coordinates;

pub const DEFAULT_REFRESH_MINUTES: u64 = 30;

/// Result of one day/night evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct ThemeDecision {
    pub is_daytime: bool,
    pub location: Option<Coordinates>,
    pub computed_at: DateTime<Utc>,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
}

impl ThemeDecision {
    /// Dark until the first successful refresh.
    pub fn dark_default(now: DateTime<Utc>) -> Self {
        Self {
            is_daytime: false,
            location: None,
            computed_at: now,
            sunrise: None,
            sunset: None,
        }
    }

    pub fn theme_name<'a>(&self, light: &'a str, dark: &'a str) -> &'a str {
        if self.is_daytime {
            light
        } else {
            dark
        }
    }
}

/// Receives decisions for the UI.
pub trait ThemePublisher: Send + Sync {
    fn publish(&self, decision: &ThemeDecision);
}

/// Forwards decisions to a UI thread over std mpsc.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: std::sync::mpsc::Sender<ThemeDecision>,
}

impl ChannelPublisher {
    pub fn new(tx: std::sync::mpsc::Sender<ThemeDecision>) -> Self {
        Self { tx }
    }
}

impl ThemePublisher for ChannelPublisher {
    fn publish(&self, decision: &ThemeDecision) {
        if self.tx.send(decision.clone()).is_err() {
            tracing::debug!("Theme receiver dropped");
        }
    }
}

/// Inputs besides the periodic tick
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Force a refresh now
    Tick,
    /// New explicit coordinates, or `None` to fall back to IP geolocation
    LocationChanged(Option<Coordinates>),
    SetAutoMode(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Refreshing,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    auto_mode: bool,
    coordinates: Option<Coordinates>,
    decision: ThemeDecision,
}

pub struct ThemeScheduler<T> {
    api: Arc<WeatherApi<T>>,
    publisher: Arc<dyn ThemePublisher>,
    refresh_every: Duration,
    state: Mutex<State>,
}

impl<T> std::fmt::Debug for ThemeScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeScheduler")
            .field("refresh_every", &self.refresh_every)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl<T: Transport> ThemeScheduler<T> {
    pub fn new(api: Arc<WeatherApi<T>>, publisher: Arc<dyn ThemePublisher>) -> Self {
        let now = api.client().clock().now();
        Self {
            api,
            publisher,
            refresh_every: Duration::from_secs(DEFAULT_REFRESH_MINUTES * 60),
            state: Mutex::new(State {
                phase: Phase::Idle,
                auto_mode: true,
                coordinates: None,
                decision: ThemeDecision::dark_default(now),
            }),
        }
    }

    pub fn with_refresh_interval(mut self, every: Duration) -> Self {
        self.refresh_every = every.max(Duration::from_secs(1));
        self
    }

    pub fn with_coordinates(self, coordinates: Option<Coordinates>) -> Self {
        self.state.lock().coordinates = coordinates;
        self
    }

    pub fn with_auto_mode(self, enabled: bool) -> Self {
        self.state.lock().auto_mode = enabled;
        self
    }

    pub fn current(&self) -> ThemeDecision {
        self.state.lock().decision.clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    pub fn auto_mode(&self) -> bool {
        self.state.lock().auto_mode
    }

    /// Theme name for the current decision.
    pub fn recommended_theme<'a>(&self, light: &'a str, dark: &'a str) -> &'a str {
        self.state.lock().decision.theme_name(light, dark)
    }

    /// Re-evaluate day/night. On failure the previous decision stays.
    ///
    /// # Errors
    /// The `FetchError` from geolocation or sun times.
    pub async fn refresh(&self) -> Result<ThemeDecision, FetchError> {
        let explicit = {
            let mut state = self.state.lock();
            state.phase = Phase::Refreshing;
            state.coordinates
        };

        let result = self.evaluate(explicit).await;

        let mut state = self.state.lock();
        state.phase = Phase::Idle;
        let decision = result?;
        state.decision = decision.clone();
        let publish = state.auto_mode;
        drop(state);

        tracing::info!(
            "Theme decision: {} (sunrise {:?}, sunset {:?})",
            if decision.is_daytime { "day" } else { "night" },
            decision.sunrise,
            decision.sunset
        );
        if publish {
            self.publisher.publish(&decision);
        }
        Ok(decision)
    }

    async fn evaluate(&self, explicit: Option<Coordinates>) -> Result<ThemeDecision, FetchError> {
        let location = match explicit {
            Some(coordinates) => coordinates,
            None => self.api.ip_location().await?.coordinates(),
        };

        let now = self.api.client().clock().now();
        let times = self.api.sun_times(location, local_date(now, &location)).await?;

        Ok(ThemeDecision {
            is_daytime: times.is_daytime(now),
            location: Some(location),
            computed_at: now,
            sunrise: Some(times.sunrise),
            sunset: Some(times.sunset),
        })
    }

    async fn refresh_logged(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!("Theme refresh failed, keeping previous decision: {}", e);
        }
    }

    async fn handle(&self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Tick => self.refresh_logged().await,
            SchedulerEvent::LocationChanged(coordinates) => {
                tracing::info!("Theme location changed: {:?}", coordinates);
                self.state.lock().coordinates = coordinates;
                self.refresh_logged().await;
            }
            SchedulerEvent::SetAutoMode(enabled) => {
                let was = std::mem::replace(&mut self.state.lock().auto_mode, enabled);
                if enabled && !was {
                    tracing::info!("Auto theme enabled");
                    self.refresh_logged().await;
                }
            }
        }
    }

    /// Refresh on every tick and event until cancelled.
    ///
    /// The first tick fires immediately. Cancellation abandons an in-flight
    /// refresh.
    pub async fn run(&self, mut events: mpsc::Receiver<SchedulerEvent>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.refresh_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let work = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = events.recv() => Some(event),
                _ = ticker.tick() => None,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = async {
                    match work {
                        Some(event) => self.handle(event).await,
                        None => self.refresh_logged().await,
                    }
                } => {}
            }
        }

        self.state.lock().phase = Phase::Idle;
        tracing::info!("Theme scheduler stopped");
    }
}

/// Calendar date at the location.
///
/// Without a named zone the offset is estimated from the longitude, one hour
/// per 15 degrees.
fn local_date(now: DateTime<Utc>, at: &Coordinates) -> NaiveDate {
    match at.timezone {
        Some(tz) => now.with_timezone(&tz).date_naive(),
        None => {
            let hours = (at.longitude / 15.0).round().clamp(-12.0, 14.0) as i32;
            match FixedOffset::east_opt(hours * 3600) {
                Some(offset) => now.with_timezone(&offset).date_naive(),
                None => now.date_naive(),
            }
        }
    }
}
