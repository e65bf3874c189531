//! Configuration management for the trainer core
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling deployments to adjust sampling cadence and storage locations
//! without recompilation. Missing or invalid files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sampling: SamplingConfig,
    pub storage: StorageConfig,
}

/// Sensor sampling cadence parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sample Source polling rate in Hz
    pub poll_hz: u32,
    /// Per-read timeout handed to the Sample Source, in milliseconds
    pub read_timeout_ms: u64,
    /// Presentation update cadence in Hz (faster than sampling, see driver)
    pub presentation_hz: u32,
    /// Capacity of the session event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            // 20 Hz matches the firmware's line output rate
            poll_hz: 20,
            read_timeout_ms: 200,
            presentation_hz: 60,
            event_channel_capacity: 256,
        }
    }
}

/// Local storage layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding the key file, user directory and pending queues
    pub data_dir: PathBuf,
    /// Key file name, relative to `data_dir`
    pub key_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("local_data"),
            key_file: "vault.key".to_string(),
        }
    }
}

impl Default for AppConfig {
    /// Default configuration values (fallback if config file not found)
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, falling back to defaults on
    /// any read or parse failure.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the conventional location next to the binary.
    pub fn load() -> Self {
        Self::load_from_file("kneeflex.json")
    }
}
