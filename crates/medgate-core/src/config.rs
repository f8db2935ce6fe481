//! Capture profiles and TOML configuration.
//!
//! The verification and enrollment flows are one parametrized pipeline with
//! slightly different constants, so both are described by a single
//! [`CaptureProfile`]. File-level configuration (`medgate.toml`) adds the
//! endpoint and camera sections consumed by `medgate-capture` and the CLI.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML was invalid.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The values parsed but are out of range.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Tuning constants for one capture pipeline variant.
///
/// Verification and enrollment are the same pipeline with slightly
/// different constants. Neither step size is privileged over the other, so
/// both presets are plain configuration rather than hardcoded behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureProfile {
    /// Gate progress per positive tick, in percent.
    #[serde(default = "default_step_size")]
    pub step_size: u8,
    /// Symmetric crop expansion around the detector box.
    #[serde(default = "default_padding_ratio")]
    pub padding_ratio: f32,
    /// Output edge length of the encoded capture.
    #[serde(default = "default_target_resolution")]
    pub target_resolution: u32,
    /// Detection tick period in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// JPEG quality of the encoded capture.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Optional overall scanning deadline in seconds. Off by default: the
    /// loop otherwise runs until presence is achieved or the user cancels.
    #[serde(default)]
    pub scan_timeout_secs: Option<u64>,
}

const fn default_step_size() -> u8 {
    4
}

const fn default_padding_ratio() -> f32 {
    0.5
}

const fn default_target_resolution() -> u32 {
    448
}

const fn default_tick_interval_ms() -> u64 {
    100
}

const fn default_jpeg_quality() -> u8 {
    85
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self::verify()
    }
}

impl CaptureProfile {
    /// Preset for the verification flow.
    #[must_use]
    pub const fn verify() -> Self {
        Self {
            step_size: 4,
            padding_ratio: 0.5,
            target_resolution: 448,
            tick_interval_ms: 100,
            jpeg_quality: 85,
            scan_timeout_secs: None,
        }
    }

    /// Preset for the enrollment/training flow.
    #[must_use]
    pub const fn enroll() -> Self {
        let mut profile = Self::verify();
        profile.step_size = 5;
        profile
    }

    /// Detection tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Optional scanning deadline.
    #[must_use]
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_secs.map(Duration::from_secs)
    }

    /// Validates ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_size == 0 || self.step_size > 100 {
            return Err(ConfigError::Validation(format!(
                "step_size must be in 1..=100, got {}",
                self.step_size
            )));
        }
        if !(0.0..=4.0).contains(&self.padding_ratio) {
            return Err(ConfigError::Validation(format!(
                "padding_ratio must be in 0.0..=4.0, got {}",
                self.padding_ratio
            )));
        }
        if self.target_resolution == 0 {
            return Err(ConfigError::Validation(
                "target_resolution must be positive".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "tick_interval_ms must be positive".to_string(),
            ));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::Validation(format!(
                "jpeg_quality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Remote verification service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL of the verification service.
    #[serde(default)]
    pub base_url: String,
    /// Per-request deadline in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connection establishment deadline in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl EndpointConfig {
    /// Per-request deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Connection deadline.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Camera device selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// OS camera index (0 = default device).
    #[serde(default)]
    pub index: u32,
    /// Requested capture width.
    #[serde(default = "default_camera_width")]
    pub width: u32,
    /// Requested capture height.
    #[serde(default = "default_camera_height")]
    pub height: u32,
}

const fn default_camera_width() -> u32 {
    1280
}

const fn default_camera_height() -> u32 {
    720
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
        }
    }
}

/// Top-level `medgate.toml` configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedgateConfig {
    /// Remote endpoint settings.
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// Camera device settings.
    #[serde(default)]
    pub camera: CameraConfig,
    /// Verification pipeline profile.
    #[serde(default = "CaptureProfile::verify")]
    pub verify: CaptureProfile,
    /// Enrollment pipeline profile.
    #[serde(default = "CaptureProfile::enroll")]
    pub enroll: CaptureProfile,
}

impl Default for MedgateConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            camera: CameraConfig::default(),
            verify: CaptureProfile::verify(),
            enroll: CaptureProfile::enroll(),
        }
    }
}

impl MedgateConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a profile is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.verify.validate()?;
        config.enroll.validate()?;
        Ok(config)
    }
}
