//! Heart Rate Monitor
//!
//! Connects to the first peripheral matching the configured selector and logs
//! its body sensor location and heart rate until the peripheral disconnects.

use anyhow::{Context, Result};
use btleplug::api::Peripheral as _;
use env_logger::Env;
use hrm_session::components::bluetooth::{
    find_peripheral, peripheral_events, select_adapter, PeripheralDriver, SessionEnd,
};
use hrm_session::components::display::LogDisplay;
use hrm_session::core::config::AppConfig;
use hrm_session::core::constants::{CONFIG_PATH_ENV, LOG_LEVEL_ENV, LOG_STYLE_ENV};
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::{self, error::RecvError};

/// Main entry point of the application.
///
/// Initializes logging, loads the configuration and runs one session on a
/// Tokio runtime.
fn main() {
    // Initialize logger with environment-specific settings.
    env_logger::Builder::from_env(
        Env::default()
            .filter_or(LOG_LEVEL_ENV, "info")
            .write_style_or(LOG_STYLE_ENV, "always"),
    )
    .init();

    let rt = Runtime::new().expect("Unable to create Runtime");
    if let Err(e) = rt.block_on(run()) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())?;

    let adapter = select_adapter(config.adapter_index).await?;
    let (peripheral, identity) = find_peripheral(
        &adapter,
        &config.selector,
        Duration::from_secs(config.scan_timeout_secs),
    )
    .await?;
    info!("Peripheral discovered: {}", identity);

    peripheral
        .connect()
        .await
        .with_context(|| format!("could not connect to {}", identity))?;
    let events = peripheral_events(&adapter, &peripheral).await?;

    let (tx, mut rx) = broadcast::channel(config.event_buffer.max(1));
    let renderer = tokio::spawn(async move {
        let mut display = LogDisplay;
        loop {
            match rx.recv().await {
                Ok(event) => display.render(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Display lagged, {} values skipped.", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut driver = PeripheralDriver::new(peripheral.clone(), tx);
    let end = driver.run(identity, events).await;
    drop(driver);

    if end == SessionEnd::StreamEnded {
        if let Err(e) = peripheral.disconnect().await {
            warn!("Could not disconnect peripheral: {}", e);
        }
    }
    renderer.await?;
    Ok(())
}
