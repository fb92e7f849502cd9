//! # Battery Module
//!
//! Best-effort battery telemetry from the input report stream.
//!
//! ## Formats
//!
//! - **Primary** (byte 30): bit 4 is the charging flag, the low nibble the
//!   level in steps of 0-10. Steps are scaled ×10; nibble values above 10 are
//!   taken as a percentage directly.
//! - **Alternate** (byte 12): used when byte 30 reads zero. The byte is the
//!   percentage itself and charging is assumed off.
//!
//! When neither byte carries data the level is unknown and reported as 50%,
//! not charging. Extraction never fails and never blocks the input path.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::mapper::{OFFSET_BATTERY, OFFSET_BATTERY_ALT};
use crate::config::BatteryConfig;

/// Charging flag in the primary battery byte.
const CHARGING_BIT: u8 = 0x10;
/// Level mask in the primary battery byte.
const LEVEL_MASK: u8 = 0x0F;
/// Reported when no battery data is present.
const UNKNOWN_LEVEL: u8 = 50;

/// Battery state at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryStatus {
    /// Charge level, 0-100.
    pub level_percent: u8,
    pub is_charging: bool,
}

impl Default for BatteryStatus {
    /// Unknown level.
    fn default() -> Self {
        Self {
            level_percent: UNKNOWN_LEVEL,
            is_charging: false,
        }
    }
}

/// Coarse battery level used for warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryLevel {
    Normal,
    Low,
    Critical,
}

impl BatteryStatus {
    /// Classifies the level against low/critical thresholds (inclusive).
    ///
    /// # Examples
    ///
    /// ```
    /// use ds4_bridge::controller::battery::{BatteryLevel, BatteryStatus};
    ///
    /// let status = BatteryStatus { level_percent: 20, is_charging: false };
    /// assert_eq!(status.level_class(20, 10), BatteryLevel::Low);
    /// ```
    #[must_use]
    pub fn level_class(&self, low: u8, critical: u8) -> BatteryLevel {
        if self.level_percent <= critical {
            BatteryLevel::Critical
        } else if self.level_percent <= low {
            BatteryLevel::Low
        } else {
            BatteryLevel::Normal
        }
    }
}

/// Decodes battery status from a report.
///
/// # Examples
///
/// ```
/// use ds4_bridge::controller::battery::extract_battery;
///
/// let mut report = [0u8; 64];
/// report[30] = 0x15; // charging, level 5
/// let status = extract_battery(&report);
/// assert_eq!(status.level_percent, 50);
/// assert!(status.is_charging);
/// ```
#[must_use]
pub fn extract_battery(report: &[u8]) -> BatteryStatus {
    if let Some(&byte) = report.get(OFFSET_BATTERY) {
        if byte != 0 {
            let raw = byte & LEVEL_MASK;
            let level_percent = if raw <= 10 { raw * 10 } else { raw.min(100) };
            return BatteryStatus {
                level_percent,
                is_charging: byte & CHARGING_BIT != 0,
            };
        }
    }

    if let Some(&byte) = report.get(OFFSET_BATTERY_ALT) {
        if byte != 0 {
            return BatteryStatus {
                level_percent: byte.min(100),
                is_charging: false,
            };
        }
    }

    BatteryStatus::default()
}

/// Rate-limited battery reader with low-battery warning.
#[derive(Debug, Clone)]
pub struct BatteryMonitor {
    interval: Duration,
    last_check: Option<Instant>,
    low_threshold: u8,
    critical_threshold: u8,
    last_status: Option<BatteryStatus>,
    warned: bool,
}

impl Default for BatteryMonitor {
    fn default() -> Self {
        Self::from_config(&BatteryConfig::default())
    }
}

/// Result of one monitor poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    pub status: BatteryStatus,
    /// Set when this reading crossed below the low threshold.
    pub low_warning: bool,
}

impl BatteryMonitor {
    /// Creates a monitor from the `[battery]` config section.
    #[must_use]
    pub fn from_config(config: &BatteryConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.check_interval_ms),
            last_check: None,
            low_threshold: config.low_threshold,
            critical_threshold: config.critical_threshold,
            last_status: None,
            warned: false,
        }
    }

    /// Last extracted status, if any.
    #[must_use]
    pub fn last_status(&self) -> Option<BatteryStatus> {
        self.last_status
    }

    /// Classifies a status with the configured thresholds.
    #[must_use]
    pub fn classify(&self, status: &BatteryStatus) -> BatteryLevel {
        status.level_class(self.low_threshold, self.critical_threshold)
    }

    /// Extracts battery status if the check interval has passed.
    ///
    /// The first call always extracts.
    pub fn poll(&mut self, report: &[u8], now: Instant) -> Option<BatteryReading> {
        if let Some(last) = self.last_check {
            if now.saturating_duration_since(last) <= self.interval {
                return None;
            }
        }
        self.last_check = Some(now);

        let status = extract_battery(report);
        if self.last_status != Some(status) {
            debug!(
                "Battery {}%{}",
                status.level_percent,
                if status.is_charging { " (charging)" } else { "" }
            );
        }
        self.last_status = Some(status);

        // A charging controller is never low; charging also re-arms the warning
        let low = !status.is_charging && status.level_percent <= self.low_threshold;
        let low_warning = low && !self.warned;
        if low_warning {
            warn!("Low battery warning: {}%", status.level_percent);
        }
        self.warned = low;

        Some(BatteryReading { status, low_warning })
    }
}
