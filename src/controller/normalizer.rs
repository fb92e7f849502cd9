//! # Stick Normalizer Module
//!
//! Converts raw 8-bit stick values into signed 16-bit XInput deflection.
//!
//! ## Scaling
//!
//! The raw domain is split at the fixed center (128), not at the midpoint of
//! the captured bounds:
//!
//! - above center: `(v - 128) / (max - 128) * 32767`
//! - below center: `(v - 128) / (128 - min) * 32767`
//!
//! Each half-range is clamped to at least 1, so an unset or degenerate
//! calibration saturates instead of dividing by zero.
//!
//! ## Adaptive Deadzone
//!
//! The zeroing threshold grows with how far the raw value sits from center
//! relative to the calibrated travel:
//!
//! `threshold = max(base, scale * |v - 128| / max(neg_range, pos_range))`
//!
//! With healthy calibration the `base` term (4000) dominates. With a tiny
//! captured range the second term takes over and suppresses phantom motion
//! from a drifted or badly calibrated stick.

use super::calibration::CalibrationEntry;
use super::mapper::{AxisId, AXIS_CENTER};
use super::xinput::STICK_MAX;
use crate::config::StickConfig;

/// Per-axis normalization settings.
///
/// # Examples
///
/// ```
/// use ds4_bridge::controller::calibration::CalibrationEntry;
/// use ds4_bridge::controller::mapper::AxisId;
/// use ds4_bridge::controller::normalizer::StickNormalizer;
///
/// let normalizer = StickNormalizer::default();
/// let cal = Some(CalibrationEntry::new(20, 230));
///
/// assert_eq!(normalizer.normalize(128, AxisId::LeftX, cal, false), 0);
/// assert_eq!(normalizer.normalize(230, AxisId::LeftX, cal, false), 32767);
/// assert_eq!(normalizer.normalize(20, AxisId::LeftX, cal, false), -32767);
/// assert_eq!(normalizer.normalize(20, AxisId::LeftX, cal, true), 32767);
/// ```
#[derive(Debug, Clone)]
pub struct StickNormalizer {
    /// Minimum deadzone per axis, in output units.
    deadzones: [f32; 4],
    /// Gain of the adaptive deadzone term.
    deadzone_scale: f32,
    /// Configured inversion per axis.
    invert: [bool; 4],
}

impl Default for StickNormalizer {
    fn default() -> Self {
        Self::from_config(&StickConfig::default())
    }
}

impl StickNormalizer {
    /// Creates a normalizer with the same minimum deadzone on every axis and
    /// no inversion.
    #[must_use]
    pub fn new(deadzone: u16, deadzone_scale: u16) -> Self {
        Self {
            deadzones: [f32::from(deadzone); 4],
            deadzone_scale: f32::from(deadzone_scale),
            invert: [false; 4],
        }
    }

    /// Creates a normalizer from the `[sticks]` config section.
    #[must_use]
    pub fn from_config(config: &StickConfig) -> Self {
        Self {
            deadzones: [
                f32::from(config.deadzone_left_x),
                f32::from(config.deadzone_left_y),
                f32::from(config.deadzone_right_x),
                f32::from(config.deadzone_right_y),
            ],
            deadzone_scale: f32::from(config.deadzone_scale),
            invert: [
                config.invert_left_x,
                config.invert_left_y,
                config.invert_right_x,
                config.invert_right_y,
            ],
        }
    }

    /// Minimum deadzone configured for `axis`.
    #[must_use]
    pub fn deadzone(&self, axis: AxisId) -> f32 {
        self.deadzones[axis.index()]
    }

    /// Whether `axis` is configured as inverted.
    #[must_use]
    pub fn is_inverted(&self, axis: AxisId) -> bool {
        self.invert[axis.index()]
    }

    /// Normalizes `raw` using the configured inversion for `axis`.
    #[must_use]
    pub fn normalize_axis(&self, raw: u8, axis: AxisId, calibration: Option<CalibrationEntry>) -> i16 {
        self.normalize(raw, axis, calibration, self.is_inverted(axis))
    }

    /// Maps a raw axis value to `-32767..=32767`.
    ///
    /// # Arguments
    ///
    /// * `raw` - Raw axis byte (0-255, 128 = center)
    /// * `axis` - Axis being normalized (selects the minimum deadzone)
    /// * `calibration` - Captured travel, `None` if the axis is uncalibrated
    /// * `invert` - Negate the result
    #[must_use]
    pub fn normalize(
        &self,
        raw: u8,
        axis: AxisId,
        calibration: Option<CalibrationEntry>,
        invert: bool,
    ) -> i16 {
        let center = i32::from(AXIS_CENTER);
        let (neg_range, pos_range) = match calibration {
            Some(entry) => (center - i32::from(entry.min), i32::from(entry.max) - center),
            None => (0, 0),
        };
        let neg_range = neg_range.max(1) as f32;
        let pos_range = pos_range.max(1) as f32;

        let delta = (i32::from(raw) - center) as f32;
        let full_scale = f32::from(STICK_MAX);

        let scaled = if delta > 0.0 {
            delta / pos_range * full_scale
        } else if delta < 0.0 {
            delta / neg_range * full_scale
        } else {
            0.0
        };

        let threshold = self
            .deadzone(axis)
            .max(self.deadzone_scale * delta.abs() / neg_range.max(pos_range));

        let value = if scaled.abs() < threshold {
            0
        } else {
            scaled.clamp(-full_scale, full_scale) as i16
        };

        if invert {
            -value
        } else {
            value
        }
    }
}
