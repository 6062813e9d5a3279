//! Device configuration persisted as a single JSON document.
//!
//! ```json
//! {"wifi":{"hostname":"leds","pwd":"…","ssid":"home","timeout":60000},
//!  "effect":{"default":"rainbow"}}
//! ```
//!
//! A missing file means defaults. The password is never handed back to
//! HTTP clients: [`DeviceConfig::masked`] blanks it, and
//! [`DeviceConfig::merge_update`] keeps the stored one when an update
//! arrives with an empty password.

use crate::media::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the configuration document under the data dir.
pub const CONFIG_FILE: &str = "config.json";

/// Default association timeout, in milliseconds.
pub const DEFAULT_WIFI_TIMEOUT_MS: u32 = 60_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct WifiConfig {
    #[schema(example = "led-driver")]
    pub hostname: String,
    /// Password. Always returned empty by the API.
    pub pwd: String,
    #[schema(example = "home")]
    pub ssid: String,
    /// Association timeout in milliseconds.
    #[schema(example = 60000)]
    pub timeout: u32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            hostname: "led-driver".to_string(),
            pwd: String::new(),
            ssid: String::new(),
            timeout: DEFAULT_WIFI_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct EffectConfig {
    /// Effect applied at boot.
    #[schema(example = "rainbow")]
    pub default: String,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            default: "default".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct DeviceConfig {
    pub wifi: WifiConfig,
    pub effect: EffectConfig,
}

impl DeviceConfig {
    /// Copy suitable for returning to clients.
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.wifi.pwd.clear();
        masked
    }

    /// Apply an update received from a client. An empty password keeps the
    /// current one, since clients only ever see it masked.
    pub fn merge_update(&mut self, mut update: DeviceConfig) {
        if update.wifi.pwd.is_empty() {
            update.wifi.pwd = std::mem::take(&mut self.wifi.pwd);
        }
        *self = update;
    }
}

/// Reads and writes [`DeviceConfig`] at a fixed path.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration; a missing file yields defaults.
    pub fn load(&self) -> Result<DeviceConfig, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeviceConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, config: &DeviceConfig) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(config)?)?;
        tracing::info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    /// Load, modify and save in one step.
    pub fn update(&self, change: impl FnOnce(&mut DeviceConfig)) -> Result<DeviceConfig, StoreError> {
        let mut config = self.load()?;
        change(&mut config);
        self.save(&config)?;
        Ok(config)
    }
}
