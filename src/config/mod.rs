// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module
//!
//! One JSON document. Every key is optional; unknown keys are kept so that
//! saving the file back does not lose settings other tools put there.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_CAMERA_PERIOD: Duration = Duration::from_millis(100);

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device index of the people/accident camera
    pub cam0_device: u32,

    /// Device index of the PPE camera
    pub cam10_device: u32,

    /// Noise alert threshold in dB
    pub noise_threshold: f64,

    pub ppe_detection_enabled: bool,

    pub accident_detection_enabled: bool,

    /// Maximum time between logger flushes
    pub log_interval_seconds: f64,

    /// Camera duty-cycle rate
    pub camera_fps: f64,

    pub audio_sample_rate: u32,

    /// Samples per audio callback block
    pub audio_chunk_size: u32,

    /// Minimum detector confidence
    pub detection_confidence: f64,

    /// Event channel capacity
    pub channel_capacity: usize,

    /// Use simulated cameras and microphone
    pub demo_mode: bool,

    /// HTTP server configuration
    pub server: ServerConfig,

    /// Durable log configuration
    pub storage: StorageConfig,

    /// Keys this version does not recognize
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cam0_device: 0,
            cam10_device: 1,
            noise_threshold: 85.0,
            ppe_detection_enabled: true,
            accident_detection_enabled: true,
            log_interval_seconds: 60.0,
            camera_fps: 10.0,
            audio_sample_rate: 44100,
            audio_chunk_size: 2048,
            detection_confidence: 0.5,
            channel_capacity: 1000,
            demo_mode: true,
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            extra: Map::new(),
        }
    }
}

impl Config {
    /// Load configuration from file. Keys are applied one by one over the
    /// defaults; a key with an unusable value keeps its default.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let loaded: Map<String, Value> = serde_json::from_str(&content)?;
        let config = Self::merged_over_defaults(loaded);
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Overlay `loaded` on the defaults, descending one level into sections
    pub fn merged_over_defaults(loaded: Map<String, Value>) -> Self {
        let mut merged = match serde_json::to_value(Self::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        for (key, value) in loaded {
            let is_section = matches!(merged.get(&key), Some(Value::Object(_)));
            match value {
                Value::Object(section) if is_section => {
                    for (field, value) in section {
                        set_checked(&mut merged, &key, Some(&field), value);
                    }
                }
                value => set_checked(&mut merged, &key, None, value),
            }
        }

        serde_json::from_value(Value::Object(merged)).unwrap_or_else(|e| {
            warn!("Merged configuration is invalid: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load, or create the file with defaults when missing. A file that cannot
    /// be parsed is left alone and the defaults are used.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            match Self::load(path) {
                Ok(config) => Ok(config),
                Err(e) => {
                    warn!("Error loading config {:?}: {}. Using defaults.", path, e);
                    Ok(Self::default())
                }
            }
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("sitewatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Time-based flush threshold
    pub fn flush_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.log_interval_seconds)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_FLUSH_INTERVAL)
    }

    /// Camera duty-cycle period
    pub fn camera_period(&self) -> Duration {
        if self.camera_fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.camera_fps).unwrap_or(DEFAULT_CAMERA_PERIOD)
        } else {
            DEFAULT_CAMERA_PERIOD
        }
    }

    /// Re-root relative storage paths under `data_dir`
    pub fn with_data_dir(mut self, data_dir: &Path) -> Self {
        if self.storage.db_path.is_relative() {
            self.storage.db_path = data_dir.join(&self.storage.db_path);
        }
        if self.storage.log_dir.is_relative() {
            self.storage.log_dir = data_dir.join(&self.storage.log_dir);
        }
        self
    }
}

/// Set `key` (or `key.field`) in `merged` if the result still deserializes
fn set_checked(merged: &mut Map<String, Value>, key: &str, field: Option<&str>, value: Value) {
    let mut candidate = merged.clone();
    match field {
        Some(field) => {
            if let Some(Value::Object(section)) = candidate.get_mut(key) {
                section.insert(field.to_string(), value);
            }
        }
        None => {
            candidate.insert(key.to_string(), value);
        }
    }

    match serde_json::from_value::<Config>(Value::Object(candidate.clone())) {
        Ok(_) => *merged = candidate,
        Err(e) => {
            let name = field.map_or_else(|| key.to_string(), |f| format!("{key}.{f}"));
            warn!("Ignoring config key {}: {}", name, e);
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Durable log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database (primary store)
    pub db_path: PathBuf,

    /// Directory for the daily CSV fallback files
    pub log_dir: PathBuf,

    /// Size-based flush threshold
    pub flush_batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("safety_logs.db"),
            log_dir: PathBuf::from("logs"),
            flush_batch_size: 100,
        }
    }
}
