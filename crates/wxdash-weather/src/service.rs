//! Weather backend handoff: async fetching off the UI thread.
//! All network work runs on the tokio runtime; results come back via mpsc.

use std::sync::Arc;
use tokio::runtime::Handle;

use crate::api::WeatherApi;
use crate::client::FetchError;
use crate::transport::Transport;
use crate::types::{Coordinates, CurrentConditions};

/// Messages sent from async operations back to the UI thread
#[derive(Debug)]
pub enum WeatherServiceMessage {
    /// Result of a city search
    FetchDone {
        city: String,
        result: Result<CurrentConditions, FetchError>,
    },
    /// Result of a lookup for the machine's own location
    LocalFetchDone(Result<CurrentConditions, FetchError>),
}

/// Fetch current weather for `city`. Sends `FetchDone` when complete.
pub fn request_fetch<T>(
    runtime: &Handle,
    tx: &std::sync::mpsc::Sender<WeatherServiceMessage>,
    api: Arc<WeatherApi<T>>,
    city: String,
) where
    T: Transport + 'static,
{
    let tx = tx.clone();
    runtime.spawn(async move {
        let result = api.current_weather(&city).await;
        if let Err(e) = &result {
            tracing::warn!("Weather fetch for {} failed: {}", city, e);
        }
        let _ = tx.send(WeatherServiceMessage::FetchDone { city, result });
    });
}

/// Fetch current weather at explicit coordinates, or at the IP location
/// when none are given. Sends `LocalFetchDone` when complete.
pub fn request_local_fetch<T>(
    runtime: &Handle,
    tx: &std::sync::mpsc::Sender<WeatherServiceMessage>,
    api: Arc<WeatherApi<T>>,
    coordinates: Option<Coordinates>,
) where
    T: Transport + 'static,
{
    let tx = tx.clone();
    runtime.spawn(async move {
        let result = async {
            let at = match coordinates {
                Some(at) => at,
                None => {
                    let location = api.ip_location().await?;
                    tracing::info!("Got location: {}, {}", location.latitude, location.longitude);
                    location.coordinates()
                }
            };
            api.current_weather_at(at).await
        }
        .await;
        let _ = tx.send(WeatherServiceMessage::LocalFetchDone(result));
    });
}
