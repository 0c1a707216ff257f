mod sink;
mod wiring;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use wxdash_core::Config;
use wxdash_weather::service::{self, WeatherServiceMessage};
use wxdash_weather::{RecordSink, SystemClock};

fn main() -> Result<()> {
    // Initialize core
    wxdash_core::init()?;

    let (config, _validation) = Config::load_validated()?;
    tracing::info!("Config directory: {}", config.config_dir.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let sink: Arc<dyn RecordSink> = Arc::new(sink::JsonLinesSink::create(&config.records_path())?);
    let client = Arc::new(wiring::build_client(&config, Arc::new(SystemClock), Some(sink)));
    let api = Arc::new(wiring::build_api(&config, client)?);

    // Optional one-off city search, e.g. `wxdash "Phoenix,AZ"`
    if let Some(city) = std::env::args().nth(1) {
        let (tx, rx) = std::sync::mpsc::channel();
        service::request_fetch(runtime.handle(), &tx, api.clone(), city);
        match rx.recv() {
            Ok(WeatherServiceMessage::FetchDone { city, result: Ok(current) }) => {
                let label = current.units.temperature_label();
                println!(
                    "{}: {} {}",
                    current.city.as_deref().unwrap_or(&city),
                    current
                        .temperature
                        .map_or_else(|| "--".to_string(), |t| format!("{:.0}{}", t, label)),
                    current.description.as_deref().unwrap_or("")
                );
            }
            Ok(WeatherServiceMessage::FetchDone { city, result: Err(e) }) => {
                tracing::error!("Weather lookup for {} failed: {}", city, e);
                eprintln!("{}", e.user_message());
            }
            Ok(other) => tracing::debug!("Unexpected message: {:?}", other),
            Err(_) => anyhow::bail!("Weather worker stopped unexpectedly"),
        }
    }

    let (theme_tx, theme_rx) = std::sync::mpsc::channel();
    let scheduler = wiring::build_scheduler(&config, api, theme_tx);
    let cancel = CancellationToken::new();
    // Held for the life of the process; a UI would send location changes here
    let (_events_tx, events_rx) = tokio::sync::mpsc::channel(8);

    runtime.spawn({
        let cancel = cancel.clone();
        async move { scheduler.run(events_rx, cancel).await }
    });
    runtime.spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Shutting down");
            cancel.cancel();
        }
    });

    tracing::info!("wxdash started");

    // Ends when the scheduler stops and drops its publisher
    for decision in theme_rx {
        println!(
            "Theme: {} ({})",
            decision.theme_name(&config.theme.light_theme, &config.theme.dark_theme),
            if decision.is_daytime { "day" } else { "night" }
        );
    }

    runtime.shutdown_timeout(Duration::from_secs(2));
    Ok(())
}
