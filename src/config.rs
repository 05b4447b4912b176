// SPDX-License-Identifier: GPL-3.0-only

//! Persistent settings
//!
//! Stored as JSON under the user config directory. Every field has a
//! default, so a partial or missing file is fine; a malformed one is an
//! error.

use crate::backends::camera::types::{DeviceId, Facing};
use crate::constants::{self, api, resolution};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Directory name under the user config directory
const CONFIG_DIR_NAME: &str = "checkpost";
/// File name of the settings file
const CONFIG_FILE_NAME: &str = "config.json";

/// A width/height pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Verification API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, without the endpoint path
    pub base_url: String,
    /// Bearer token from the session layer
    pub auth_token: Option<String>,
    /// Request timeout; no timeout when unset
    pub request_timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: api::DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            request_timeout_secs: None,
        }
    }
}

/// Camera selection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub preferred_facing: Facing,
    /// Device id to prefer over the facing rule
    pub preferred_device: Option<String>,
    /// Resolution hint for the decoding stream
    pub scan_resolution: Resolution,
    /// Ideal resolution for the still capture stream
    pub capture_resolution: Resolution,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preferred_facing: Facing::Environment,
            preferred_device: None,
            scan_resolution: Resolution::new(resolution::SCAN_WIDTH, resolution::SCAN_HEIGHT),
            capture_resolution: Resolution::new(
                resolution::CAPTURE_WIDTH,
                resolution::CAPTURE_HEIGHT,
            ),
        }
    }
}

impl CameraConfig {
    pub fn preferred_device_id(&self) -> Option<DeviceId> {
        self.preferred_device.as_deref().map(DeviceId::new)
    }
}

/// Scanning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Decode attempts per second
    pub sample_rate_hz: f32,
    /// Centred region decoded in each frame; whole frame when unset
    pub scan_window: Option<Resolution>,
    /// Viewfinder width `scan_window` is measured against
    pub viewfinder_width: u32,
    /// Pause on an accepted code before the capture view opens
    pub confirm_delay_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: constants::DECODE_SAMPLE_RATE_HZ,
            scan_window: Some(Resolution::new(
                constants::SCAN_WINDOW_SIZE,
                constants::SCAN_WINDOW_SIZE,
            )),
            viewfinder_width: constants::SCAN_VIEWFINDER_WIDTH,
            confirm_delay_ms: constants::SCAN_CONFIRM_DELAY.as_millis() as u64,
        }
    }
}

/// Still capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub shutter_delay_ms: u64,
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            shutter_delay_ms: constants::SHUTTER_DELAY.as_millis() as u64,
            jpeg_quality: constants::CAPTURE_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub camera: CameraConfig,
    pub scan: ScanConfig,
    pub capture: CaptureConfig,
}

impl Config {
    /// Default location of the settings file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, or defaults if there is none
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config = serde_json::from_str(&text)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Write to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Write to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path()
            .ok_or_else(|| ConfigError::Io("no config directory available".to_string()))?;
        self.save_to(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "api": { "auth_token": "abc" }, "scan": { "sample_rate_hz": 5.0 } }"#)
                .unwrap();

        assert_eq!(config.api.auth_token.as_deref(), Some("abc"));
        assert_eq!(config.api.base_url, api::DEFAULT_BASE_URL);
        assert_eq!(config.scan.sample_rate_hz, 5.0);
        assert_eq!(config.scan.confirm_delay_ms, 800);
        assert_eq!(config.camera, CameraConfig::default());
    }

    #[test]
    fn test_facing_is_lowercase_in_json() {
        let mut config = Config::default();
        config.camera.preferred_facing = Facing::User;
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""preferred_facing":"user""#));
    }

    #[test]
    fn test_preferred_device_id() {
        let mut camera = CameraConfig::default();
        assert_eq!(camera.preferred_device_id(), None);
        camera.preferred_device = Some("cam0".into());
        assert_eq!(camera.preferred_device_id(), Some(DeviceId::new("cam0")));
    }
}
