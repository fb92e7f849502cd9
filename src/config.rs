//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; anything missing takes its default.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Ds4BridgeError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub sticks: StickConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Controller connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    /// HID device path to open; empty means auto-detect.
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Stick normalization configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StickConfig {
    #[serde(default = "default_deadzone")]
    pub deadzone_left_x: u16,

    #[serde(default = "default_deadzone")]
    pub deadzone_left_y: u16,

    #[serde(default = "default_deadzone")]
    pub deadzone_right_x: u16,

    #[serde(default = "default_deadzone")]
    pub deadzone_right_y: u16,

    #[serde(default = "default_deadzone_scale")]
    pub deadzone_scale: u16,

    #[serde(default)]
    pub invert_left_x: bool,

    #[serde(default = "default_true")]
    pub invert_left_y: bool,

    #[serde(default)]
    pub invert_right_x: bool,

    #[serde(default = "default_true")]
    pub invert_right_y: bool,
}

/// Calibration capture configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Capture length; 0 waits for an explicit stop.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

/// Drift detection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DriftConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    #[serde(default = "default_window_samples")]
    pub window_samples: usize,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default = "default_center_deviation")]
    pub center_deviation: f32,

    #[serde(default = "default_stable_range")]
    pub stable_range: u8,

    #[serde(default = "default_one_sided_ratio")]
    pub one_sided_ratio: f32,

    #[serde(default = "default_trigger_activity_threshold")]
    pub trigger_activity_threshold: u8,
}

/// Battery telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BatteryConfig {
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,

    #[serde(default = "default_low_threshold")]
    pub low_threshold: u8,

    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: u8,
}

/// Event telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostic log configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; empty logs to the console only.
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_true() -> bool { true }

fn default_read_timeout_ms() -> u64 { 100 }
fn default_reconnect_interval_ms() -> u64 { 3000 }
fn default_max_retry_attempts() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }

fn default_deadzone() -> u16 { 4000 }
fn default_deadzone_scale() -> u16 { 2000 }

fn default_settle_ms() -> u64 { 500 }
fn default_window_ms() -> u64 { 10_000 }

fn default_sample_interval_ms() -> u64 { 100 }
fn default_window_samples() -> usize { 30 }
fn default_min_samples() -> usize { 10 }
fn default_center_deviation() -> f32 { 8.0 }
fn default_stable_range() -> u8 { 6 }
fn default_one_sided_ratio() -> f32 { 0.8 }
fn default_trigger_activity_threshold() -> u8 { 10 }

fn default_check_interval_ms() -> u64 { 2000 }
fn default_low_threshold() -> u8 { 20 }
fn default_critical_threshold() -> u8 { 10 }

fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            read_timeout_ms: default_read_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            max_retry_attempts: default_max_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for StickConfig {
    fn default() -> Self {
        Self {
            deadzone_left_x: default_deadzone(),
            deadzone_left_y: default_deadzone(),
            deadzone_right_x: default_deadzone(),
            deadzone_right_y: default_deadzone(),
            deadzone_scale: default_deadzone_scale(),
            invert_left_x: false,
            invert_left_y: true,
            invert_right_x: false,
            invert_right_y: true,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            window_ms: default_window_ms(),
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_ms: default_sample_interval_ms(),
            window_samples: default_window_samples(),
            min_samples: default_min_samples(),
            center_deviation: default_center_deviation(),
            stable_range: default_stable_range(),
            one_sided_ratio: default_one_sided_ratio(),
            trigger_activity_threshold: default_trigger_activity_threshold(),
        }
    }
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            low_threshold: default_low_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

/// Shorthand for a validation failure.
fn invalid(msg: impl std::fmt::Display) -> Ds4BridgeError {
    Ds4BridgeError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ds4_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Controller timing
        if self.controller.read_timeout_ms == 0 || self.controller.read_timeout_ms > 10000 {
            return Err(invalid("read_timeout_ms must be between 1 and 10000"));
        }

        if self.controller.reconnect_interval_ms == 0 || self.controller.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        if self.controller.max_retry_attempts == 0 {
            return Err(invalid("max_retry_attempts must be greater than 0"));
        }

        if self.controller.retry_delay_ms > 60000 {
            return Err(invalid("retry_delay_ms must be at most 60000"));
        }

        // Stick deadzones
        for (name, value) in [
            ("deadzone_left_x", self.sticks.deadzone_left_x),
            ("deadzone_left_y", self.sticks.deadzone_left_y),
            ("deadzone_right_x", self.sticks.deadzone_right_x),
            ("deadzone_right_y", self.sticks.deadzone_right_y),
        ] {
            if value > 32767 {
                return Err(invalid(format!("{} must be between 0 and 32767", name)));
            }
        }

        if self.sticks.deadzone_scale > 32767 {
            return Err(invalid("deadzone_scale must be between 0 and 32767"));
        }

        // Calibration
        if self.calibration.settle_ms > 10000 {
            return Err(invalid("settle_ms must be at most 10000"));
        }

        if self.calibration.window_ms != 0 && self.calibration.window_ms <= self.calibration.settle_ms {
            return Err(invalid("window_ms must be 0 or longer than settle_ms"));
        }

        // Drift detection
        if self.drift.sample_interval_ms == 0 || self.drift.sample_interval_ms > 10000 {
            return Err(invalid("sample_interval_ms must be between 1 and 10000"));
        }

        if self.drift.window_samples == 0
            || self.drift.window_samples > crate::controller::drift::SAMPLE_CAPACITY
        {
            return Err(invalid(format!(
                "window_samples must be between 1 and {}",
                crate::controller::drift::SAMPLE_CAPACITY
            )));
        }

        if self.drift.min_samples == 0 || self.drift.min_samples > self.drift.window_samples {
            return Err(invalid("min_samples must be between 1 and window_samples"));
        }

        if self.drift.center_deviation < 0.0 || self.drift.center_deviation > 127.0 {
            return Err(invalid("center_deviation must be between 0.0 and 127.0"));
        }

        if self.drift.one_sided_ratio < 0.5 || self.drift.one_sided_ratio > 1.0 {
            return Err(invalid("one_sided_ratio must be between 0.5 and 1.0"));
        }

        // Battery
        if self.battery.check_interval_ms == 0 || self.battery.check_interval_ms > 60000 {
            return Err(invalid("check_interval_ms must be between 1 and 60000"));
        }

        if self.battery.low_threshold > 100 {
            return Err(invalid("low_threshold must be between 0 and 100"));
        }

        if self.battery.critical_threshold > self.battery.low_threshold {
            return Err(invalid("critical_threshold must not exceed low_threshold"));
        }

        // Telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }
}
