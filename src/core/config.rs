//! Application Configuration
//!
//! Settings are read from a JSON file. Missing fields fall back to their
//! defaults, so an empty object `{}` is a valid configuration.
use anyhow::{Context, Result};
use btleplug::api::BDAddr;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::core::constants::HEARTRATE_SERVICE_UUID;

/// Policy used to pick the peripheral to connect to while scanning.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeripheralSelector {
    /// First peripheral advertising the Heart Rate Service.
    #[default]
    AdvertisesHeartRateService,
    /// Peripheral whose advertised local name matches exactly.
    LocalName(String),
    /// Peripheral with the given MAC address (case-insensitive).
    Address(String),
}

impl PeripheralSelector {
    /// Checks an advertisement against the selector.
    pub fn matches(&self, name: Option<&str>, address: BDAddr, services: &[Uuid]) -> bool {
        match self {
            PeripheralSelector::AdvertisesHeartRateService => {
                services.contains(&HEARTRATE_SERVICE_UUID)
            }
            PeripheralSelector::LocalName(expected) => name == Some(expected.as_str()),
            PeripheralSelector::Address(expected) => {
                address.to_string().eq_ignore_ascii_case(expected.trim())
            }
        }
    }

    /// Service filter to hand to the scanner, if the selector allows one.
    pub fn scan_services(&self) -> Vec<Uuid> {
        match self {
            PeripheralSelector::AdvertisesHeartRateService => vec![HEARTRATE_SERVICE_UUID],
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub selector: PeripheralSelector,
    /// Seconds to wait for a matching advertisement.
    pub scan_timeout_secs: u64,
    /// Index into the adapters reported by the platform manager.
    pub adapter_index: usize,
    /// Capacity of the display event channel.
    pub event_buffer: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            selector: PeripheralSelector::default(),
            scan_timeout_secs: 30,
            adapter_index: 0,
            event_buffer: 16,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Loads the configuration from `path` if one is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
