use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::errors::CallError;

const CONFIG_FILE: &str = "config.json";

/// Static client configuration.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub livekit: LivekitConfig,
    #[serde(default)]
    pub media_devices: MediaDevicesConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LivekitConfig {
    /// Fallback focus used when neither memberships nor discovery provide one.
    #[serde(default)]
    pub livekit_service_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MediaDevicesConfig {
    #[serde(default = "default_true")]
    pub enable_audio: bool,
    #[serde(default = "default_true")]
    pub enable_video: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MediaDevicesConfig {
    fn default() -> Self {
        Self {
            enable_audio: true,
            enable_video: true,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, CallError> {
        serde_json::from_str(json).map_err(|e| CallError::Config(e.to_string()))
    }
}

/// Holds the current [`Config`] and notifies subscribers when it changes.
pub struct ConfigStore {
    tx: watch::Sender<Config>,
    file_path: Option<PathBuf>,
}

impl ConfigStore {
    /// Load `config.json` from `data_dir`, falling back to defaults.
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join(CONFIG_FILE);
        let config = Self::load(&file_path);
        let (tx, _) = watch::channel(config);
        Self {
            tx,
            file_path: Some(file_path),
        }
    }

    /// A store not backed by a file.
    pub fn in_memory(config: Config) -> Self {
        let (tx, _) = watch::channel(config);
        Self { tx, file_path: None }
    }

    pub fn get(&self) -> Config {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Config> {
        self.tx.subscribe()
    }

    /// Replace the configuration; subscribers are only woken on a real change.
    pub fn replace(&self, config: Config) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == config {
                false
            } else {
                *current = config;
                true
            }
        });
        if changed {
            tracing::info!("configuration updated");
        }
    }

    /// Re-read the backing file, if any.
    pub fn reload(&self) {
        if let Some(path) = &self.file_path {
            self.replace(Self::load(path));
        }
    }

    fn load(path: &Path) -> Config {
        match std::fs::read_to_string(path) {
            Ok(contents) => Config::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("ignoring unreadable config at {}: {e}", path.display());
                Config::default()
            }),
            Err(_) => Config::default(),
        }
    }
}
