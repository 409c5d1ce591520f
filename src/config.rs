// src/config.rs

//! Configuration for capture negotiation and presentation.
//!
//! Settings deserialize from JSON. Every struct carries `#[serde(default)]`,
//! so a file only needs the fields it overrides. The process-wide `CONFIG`
//! is read from the file named by `FRAMEVIEW_CONFIG` on first use and falls
//! back to defaults when the variable is unset or the file is unusable.

use anyhow::Context;
use log::{info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "FRAMEVIEW_CONFIG";

/// Global configuration, loaded once.
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

// --- Top-Level Configuration Structure ---

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// What to ask the capture source for.
    pub capture: CaptureConfig,
    /// How to present it.
    pub display: DisplayConfig,
}

impl Config {
    /// Parses a JSON document.
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("Failed to parse configuration JSON")
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Loads from `FRAMEVIEW_CONFIG`, or defaults.
    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR) else {
            info!("{} not set, using default configuration", CONFIG_ENV_VAR);
            return Config::default();
        };
        match Config::load(Path::new(&path)) {
            Ok(config) => {
                info!("Configuration loaded from {}", Path::new(&path).display());
                config
            }
            Err(e) => {
                warn!("{:#}; using default configuration", e);
                Config::default()
            }
        }
    }
}

// --- Capture Configuration ---

/// The capture mode to negotiate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    /// Required frames per second.
    pub fps: f64,
    /// How far a native frame rate may deviate from `fps` and still match.
    pub fps_tolerance: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            width: 1280,
            height: 720,
            fps: 30.0,
            fps_tolerance: 0.05,
        }
    }
}

// --- Display Configuration ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Initial client-area size of the preview window.
    pub window_width: u32,
    pub window_height: u32,
    /// Letterbox fill as `[red, green, blue]`.
    pub background: [u8; 3],
    pub back_buffer_count: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            window_width: 1280,
            window_height: 720,
            background: [0, 0, 0x80], // Navy
            back_buffer_count: 2,
        }
    }
}
