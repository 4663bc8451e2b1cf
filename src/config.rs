use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use directories::ProjectDirs;
use serde::Deserialize;
use strum_macros::Display;
use tracing::{debug, instrument};

use crate::error::ConfigError;

const DEV_SETTINGS_FILE: &str = "settings.dev.json";
const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_CHECK_PERIOD_S: u64 = 5;
const DEFAULT_UPDATE_PERIOD_S: u64 = 5;
const DEFAULT_PRINT_TIMEOUT_S: u64 = 3;
const DEFAULT_MQTT_PORT: u16 = 1883;

/// Which transport carries status and print traffic.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Display, Deserialize)]
pub enum TransportMode {
    #[serde(rename = "mqtt")]
    #[strum(to_string = "mqtt")]
    Mqtt,
    #[serde(rename = "signalr", alias = "push")]
    #[strum(to_string = "signalr")]
    Hub,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Builder)]
pub struct MqttSettings {
    #[builder(into)]
    pub mqtt_broker_host: String,
    #[serde(default = "default_mqtt_port")]
    #[builder(default = DEFAULT_MQTT_PORT)]
    pub mqtt_broker_port: u16,
    #[serde(default)]
    pub tls_cafile: Option<PathBuf>,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Builder)]
pub struct HubSettings {
    #[builder(into)]
    pub endpoint: String,
    #[serde(default = "default_true")]
    #[builder(default = true)]
    pub verify_ssl: bool,
}

/// Host settings loaded from a JSON file.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Builder)]
pub struct Settings {
    pub mode: TransportMode,
    #[serde(default = "default_check_period")]
    #[builder(default = DEFAULT_CHECK_PERIOD_S)]
    pub printer_check_period_s: u64,
    #[serde(default = "default_update_period")]
    #[builder(default = DEFAULT_UPDATE_PERIOD_S)]
    pub status_update_period_s: u64,
    #[serde(default = "default_print_timeout")]
    #[builder(default = DEFAULT_PRINT_TIMEOUT_S)]
    pub print_timeout_s: u64,
    /// Overrides the kernel host name in topics and status snapshots.
    #[serde(default)]
    #[builder(into)]
    pub host_name: Option<String>,
    #[serde(default)]
    pub mqtt: Option<MqttSettings>,
    #[serde(default, rename = "signalr")]
    pub hub: Option<HubSettings>,
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_true() -> bool {
    true
}

fn default_check_period() -> u64 {
    DEFAULT_CHECK_PERIOD_S
}

fn default_update_period() -> u64 {
    DEFAULT_UPDATE_PERIOD_S
}

fn default_print_timeout() -> u64 {
    DEFAULT_PRINT_TIMEOUT_S
}

impl Settings {
    /// Loads settings from an explicit path or the default search locations.
    ///
    /// # Errors
    ///
    /// Returns an error when no file is found, the file cannot be read or
    /// parsed, or the parsed settings fail validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let candidates = match explicit {
            Some(path) => vec![path.to_path_buf()],
            None => default_search_paths(),
        };
        let path = candidates
            .iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ConfigError::NotFound {
                searched: candidates.clone(),
            })?;

        Self::load_from(path)
    }

    /// Loads and validates one settings file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, parsed or validated.
    #[instrument(level = "debug", fields(path = %path.display()))]
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        debug!(mode = %settings.mode, "loaded settings");
        Ok(settings)
    }

    /// Checks cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns an error for a missing transport block or a zero period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mode {
            TransportMode::Mqtt if self.mqtt.is_none() => {
                return Err(ConfigError::MissingTransportBlock {
                    mode: self.mode.to_string(),
                    block: "mqtt",
                });
            }
            TransportMode::Hub if self.hub.is_none() => {
                return Err(ConfigError::MissingTransportBlock {
                    mode: self.mode.to_string(),
                    block: "signalr",
                });
            }
            _ => {}
        }

        for (field, value) in [
            ("printer_check_period_s", self.printer_check_period_s),
            ("status_update_period_s", self.status_update_period_s),
            ("print_timeout_s", self.print_timeout_s),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroPeriod { field });
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn printer_check_period(&self) -> Duration {
        Duration::from_secs(self.printer_check_period_s)
    }

    #[must_use]
    pub fn status_update_period(&self) -> Duration {
        Duration::from_secs(self.status_update_period_s)
    }

    #[must_use]
    pub fn print_timeout(&self) -> Duration {
        Duration::from_secs(self.print_timeout_s)
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(DEV_SETTINGS_FILE), PathBuf::from(SETTINGS_FILE)];
    if let Some(dirs) = ProjectDirs::from("", "", "labelbridge") {
        paths.push(dirs.config_dir().join(SETTINGS_FILE));
    }
    paths
}
