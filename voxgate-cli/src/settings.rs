//! Optional JSON settings file for the CLI.
//!
//! The file is loaded best-effort: a missing or malformed file falls back
//! to defaults, and any field left out of a partial document keeps its
//! default. Command-line flags are merged over whatever loads.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use voxgate_core::vad::DetectorConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub preferred_input_device: Option<String>,
    /// Spectral magnitude smoothing across frames, clamped into [0, 1).
    pub smoothing_time_constant: f32,
    pub detector: DetectorConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            preferred_input_device: None,
            smoothing_time_constant: 0.99,
            detector: DetectorConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.smoothing_time_constant = self.smoothing_time_constant.clamp(0.0, 0.999);
        self.preferred_input_device = self
            .preferred_input_device
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn default_settings_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Voxgate")
            .join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxgate")
            .join("settings.json")
    }
}
