use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::presence::{ManagerOptions, PresenceText, ReconnectPolicy};

const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "game-presence";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to get config directory")]
    NoConfigDir,
    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Discord,
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub application_id: String,
    pub backend: Backend,
    /// Port of the local control server, 0 picks a free one
    pub control_port: u16,
    pub tick_interval_ms: u64,
    pub fetch_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
    /// Remote instance lookups; instances reported by the game are used otherwise
    pub instance_status_url: Option<String>,
    pub text: PresenceText,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            backend: Backend::Discord,
            control_port: 0,
            tick_interval_ms: 100,
            fetch_timeout_secs: 10,
            reconnect: ReconnectPolicy::Resume,
            instance_status_url: None,
            text: PresenceText::default(),
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions {
            application_id: self.application_id.clone(),
            text: self.text.clone(),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            reconnect: self.reconnect,
        }
    }
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(config_dir.join(APP_DIR).join(SETTINGS_FILE))
}

/// Load settings from `path`, falling back to defaults when it does not exist
pub fn load_settings(path: &Path) -> Result<Settings, SettingsError> {
    tracing::debug!("Loading settings from {}", path.display());

    if !path.exists() {
        tracing::info!("No settings file at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(serde_json::from_str(&contents)?)
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    tracing::debug!("Saving settings to {}", path.display());
    let io_error = |source: std::io::Error| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let contents = serde_json::to_string_pretty(settings)?;
    fs::write(path, contents).map_err(io_error)
}
