//! # Calibration Module
//!
//! Captures the physical travel of each stick over a timed window.
//!
//! ## Capture
//!
//! While calibrating, every accepted report widens the running min/max of
//! each axis. The user is expected to rotate both sticks through their full
//! range. The center is never derived from the captured bounds: it stays at the
//! theoretical 128 so a lopsided capture cannot shift the rest position.
//!
//! ## Settling Delay
//!
//! Samples arriving within the settling delay after [`CalibrationEngine::start`]
//! are ignored. This absorbs the stick movement caused by releasing whatever
//! button started the calibration, without blocking the polling loop.
//!
//! ## Usage
//!
//! ```
//! use std::time::{Duration, Instant};
//! use ds4_bridge::controller::calibration::CalibrationEngine;
//! use ds4_bridge::controller::mapper::AxisId;
//!
//! let mut engine = CalibrationEngine::new(Duration::from_millis(500), None);
//! let t0 = Instant::now();
//! engine.start(t0);
//!
//! let report = [0u8, 20, 128, 128, 230];
//! assert!(!engine.sample(&report, t0 + Duration::from_millis(100))); // settling
//! assert!(engine.sample(&report, t0 + Duration::from_millis(600)));
//!
//! let table = engine.stop().unwrap();
//! assert_eq!(table.get(AxisId::LeftX).unwrap().min, 20);
//! assert_eq!(table.get(AxisId::RightY).unwrap().max, 230);
//! ```

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::mapper::{read_axes, AxisId, AXIS_CENTER};
use crate::config::CalibrationConfig;

/// Captured travel of one axis.
///
/// The center is fixed at [`AXIS_CENTER`]; entries built through
/// [`CalibrationEntry::new`] or [`CalibrationEntry::widen`] always satisfy
/// `min <= center <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationEntry {
    /// Lowest raw value seen.
    pub min: u8,
    /// Highest raw value seen.
    pub max: u8,
}

impl CalibrationEntry {
    /// Creates an entry, widening the bounds to include the center.
    #[must_use]
    pub fn new(min: u8, max: u8) -> Self {
        Self {
            min: min.min(AXIS_CENTER),
            max: max.max(AXIS_CENTER),
        }
    }

    /// The full 0-255 travel of an ideal stick.
    #[must_use]
    pub const fn full_range() -> Self {
        Self { min: 0, max: 255 }
    }

    /// Entry produced by the first sample of a capture.
    #[must_use]
    pub fn from_sample(value: u8) -> Self {
        Self::new(value, value)
    }

    /// Fixed center value.
    #[must_use]
    pub const fn center(&self) -> u8 {
        AXIS_CENTER
    }

    /// Extends the bounds to include `value`.
    pub fn widen(&mut self, value: u8) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

impl Serialize for CalibrationEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CalibrationEntry", 3)?;
        s.serialize_field("min", &self.min)?;
        s.serialize_field("max", &self.max)?;
        s.serialize_field("center", &self.center())?;
        s.end()
    }
}

/// Calibration for all four axes.
///
/// Every axis is always present; `None` marks an axis with no captured samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationTable {
    entries: [Option<CalibrationEntry>; 4],
}

impl Default for CalibrationTable {
    /// Full-range table used before any calibration has been run.
    fn default() -> Self {
        Self::full_range()
    }
}

impl CalibrationTable {
    /// Table with every axis unset, as at the start of a capture.
    #[must_use]
    pub const fn unset() -> Self {
        Self { entries: [None; 4] }
    }

    /// Table assuming ideal 0-255 travel on every axis.
    #[must_use]
    pub const fn full_range() -> Self {
        Self {
            entries: [Some(CalibrationEntry::full_range()); 4],
        }
    }

    /// Entry for one axis.
    #[must_use]
    pub fn get(&self, axis: AxisId) -> Option<CalibrationEntry> {
        self.entries[axis.index()]
    }

    /// Replaces the entry for one axis.
    pub fn set(&mut self, axis: AxisId, entry: Option<CalibrationEntry>) {
        self.entries[axis.index()] = entry;
    }

    /// Folds one raw sample into the entry for `axis`.
    pub fn widen(&mut self, axis: AxisId, value: u8) {
        let slot = &mut self.entries[axis.index()];
        match slot {
            Some(entry) => entry.widen(value),
            None => *slot = Some(CalibrationEntry::from_sample(value)),
        }
    }

    /// True once every axis has at least one sample.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    /// Iterates `(axis, entry)` pairs in [`AxisId::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (AxisId, Option<CalibrationEntry>)> + '_ {
        AxisId::ALL.into_iter().map(move |axis| (axis, self.get(axis)))
    }
}

impl Serialize for CalibrationTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureState {
    Idle,
    Calibrating { started_at: Instant },
}

/// Stateful min/max capture.
///
/// Idle → Calibrating → Idle. The captured table stays active after
/// [`stop`](Self::stop) until the next capture replaces it.
#[derive(Debug, Clone)]
pub struct CalibrationEngine {
    table: CalibrationTable,
    state: CaptureState,
    settle: Duration,
    window: Option<Duration>,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }
}

impl CalibrationEngine {
    /// Creates an idle engine with a full-range table.
    ///
    /// # Arguments
    ///
    /// * `settle` - Samples within this long after start are ignored
    /// * `window` - Capture length after which the translator stops calibration
    ///   on its own; `None` waits for an explicit stop
    #[must_use]
    pub fn new(settle: Duration, window: Option<Duration>) -> Self {
        Self {
            table: CalibrationTable::full_range(),
            state: CaptureState::Idle,
            settle,
            window,
        }
    }

    /// Creates an engine from the `[calibration]` config section.
    #[must_use]
    pub fn from_config(config: &CalibrationConfig) -> Self {
        let window = (config.window_ms > 0).then(|| Duration::from_millis(config.window_ms));
        Self::new(Duration::from_millis(config.settle_ms), window)
    }

    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        matches!(self.state, CaptureState::Calibrating { .. })
    }

    /// The active (or in-progress) calibration table.
    #[must_use]
    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Installs a previously captured table, e.g. one restored by the host.
    pub fn set_table(&mut self, table: CalibrationTable) {
        self.table = table;
    }

    /// Begins a capture. All entries are reset to unset.
    pub fn start(&mut self, now: Instant) {
        self.table = CalibrationTable::unset();
        self.state = CaptureState::Calibrating { started_at: now };
        info!(
            "Calibration started (settling {} ms)",
            self.settle.as_millis()
        );
    }

    /// Folds one report into the capture.
    ///
    /// Returns `true` if the sample was accepted. Samples are rejected when
    /// idle, during the settling delay, or for reports too short to carry axes.
    pub fn sample(&mut self, report: &[u8], now: Instant) -> bool {
        let CaptureState::Calibrating { started_at } = self.state else {
            return false;
        };

        if now.saturating_duration_since(started_at) < self.settle {
            return false;
        }

        let Some(axes) = read_axes(report) else {
            return false;
        };

        for axis in AxisId::ALL {
            self.table.widen(axis, axes[axis.index()]);
        }
        true
    }

    /// True when a timed window is configured and has run out.
    #[must_use]
    pub fn window_elapsed(&self, now: Instant) -> bool {
        match (self.state, self.window) {
            (CaptureState::Calibrating { started_at }, Some(window)) => {
                now.saturating_duration_since(started_at) >= window
            }
            _ => false,
        }
    }

    /// Ends the capture and returns the frozen table.
    ///
    /// Returns `None` if no capture was running.
    pub fn stop(&mut self) -> Option<CalibrationTable> {
        if !self.is_calibrating() {
            return None;
        }
        self.state = CaptureState::Idle;

        for (axis, entry) in self.table.iter() {
            match entry {
                Some(e) => debug!("Calibrated {}: min={} max={}", axis, e.min, e.max),
                None => debug!("Calibrated {}: no samples", axis),
            }
        }
        info!("Calibration finished");
        Some(self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTLE: Duration = Duration::from_millis(500);

    fn axes_report(lx: u8, ly: u8, rx: u8, ry: u8) -> [u8; 5] {
        [0, lx, ly, rx, ry]
    }

    // ==================== Entry Tests ====================

    #[test]
    fn test_entry_includes_center() {
        let entry = CalibrationEntry::new(140, 150);
        assert_eq!(entry.min, 128);
        assert_eq!(entry.max, 150);

        let entry = CalibrationEntry::from_sample(100);
        assert_eq!(entry.min, 100);
        assert_eq!(entry.max, 128);
        assert_eq!(entry.center(), 128);
    }

    #[test]
    fn test_entry_widen() {
        let mut entry = CalibrationEntry::from_sample(128);
        entry.widen(20);
        entry.widen(230);
        entry.widen(100);
        assert_eq!(entry, CalibrationEntry { min: 20, max: 230 });
    }

    #[test]
    fn test_entry_serializes_center() {
        let json = serde_json::to_value(CalibrationEntry::new(20, 230)).unwrap();
        assert_eq!(json["min"], 20);
        assert_eq!(json["max"], 230);
        assert_eq!(json["center"], 128);
    }

    // ==================== Table Tests ====================

    #[test]
    fn test_table_default_is_full_range() {
        let table = CalibrationTable::default();
        for (_, entry) in table.iter() {
            assert_eq!(entry, Some(CalibrationEntry::full_range()));
        }
        assert!(table.is_complete());
    }

    #[test]
    fn test_table_unset_has_all_keys() {
        let table = CalibrationTable::unset();
        assert_eq!(table.iter().count(), 4);
        assert!(table.iter().all(|(_, entry)| entry.is_none()));
        assert!(!table.is_complete());
    }

    #[test]
    fn test_table_serializes_as_axis_map() {
        let mut table = CalibrationTable::unset();
        table.widen(AxisId::LeftX, 30);
        let json = serde_json::to_value(table).unwrap();
        assert_eq!(json["left_x"]["min"], 30);
        assert!(json["right_y"].is_null());
    }

    // ==================== Engine Tests ====================

    #[test]
    fn test_start_resets_table() {
        let mut engine = CalibrationEngine::new(SETTLE, None);
        assert!(engine.table().is_complete());

        engine.start(Instant::now());
        assert!(engine.is_calibrating());
        assert_eq!(*engine.table(), CalibrationTable::unset());
    }

    #[test]
    fn test_settling_delay_ignores_early_samples() {
        let mut engine = CalibrationEngine::new(SETTLE, None);
        let t0 = Instant::now();
        engine.start(t0);

        assert!(!engine.sample(&axes_report(0, 0, 0, 0), t0));
        assert!(!engine.sample(&axes_report(0, 0, 0, 0), t0 + Duration::from_millis(499)));
        assert_eq!(*engine.table(), CalibrationTable::unset());

        assert!(engine.sample(&axes_report(60, 128, 128, 128), t0 + SETTLE));
        assert_eq!(engine.table().get(AxisId::LeftX).unwrap().min, 60);
    }

    #[test]
    fn test_sample_tracks_min_max() {
        let mut engine = CalibrationEngine::new(Duration::ZERO, None);
        let t0 = Instant::now();
        engine.start(t0);

        for (lx, ly) in [(128, 128), (20, 200), (230, 40), (128, 128)] {
            assert!(engine.sample(&axes_report(lx, ly, 128, 128), t0));
        }

        let table = engine.stop().unwrap();
        assert_eq!(table.get(AxisId::LeftX), Some(CalibrationEntry { min: 20, max: 230 }));
        assert_eq!(table.get(AxisId::LeftY), Some(CalibrationEntry { min: 40, max: 200 }));
        assert_eq!(table.get(AxisId::RightX), Some(CalibrationEntry { min: 128, max: 128 }));
    }

    #[test]
    fn test_sample_rejects_short_reports() {
        let mut engine = CalibrationEngine::new(Duration::ZERO, None);
        let t0 = Instant::now();
        engine.start(t0);
        assert!(!engine.sample(&[0, 1, 2, 3], t0));
        assert!(!engine.sample(&[], t0));
    }

    #[test]
    fn test_sample_when_idle_is_ignored() {
        let mut engine = CalibrationEngine::new(Duration::ZERO, None);
        assert!(!engine.sample(&axes_report(0, 0, 0, 0), Instant::now()));
        assert_eq!(*engine.table(), CalibrationTable::full_range());
    }

    #[test]
    fn test_stop_keeps_table_active() {
        let mut engine = CalibrationEngine::new(Duration::ZERO, None);
        let t0 = Instant::now();
        engine.start(t0);
        engine.sample(&axes_report(10, 10, 10, 10), t0);

        let frozen = engine.stop().unwrap();
        assert!(!engine.is_calibrating());
        assert_eq!(*engine.table(), frozen);
    }

    #[test]
    fn test_stop_when_idle_returns_none() {
        let mut engine = CalibrationEngine::new(SETTLE, None);
        assert!(engine.stop().is_none());
    }

    #[test]
    fn test_window_elapsed() {
        let mut engine = CalibrationEngine::new(SETTLE, Some(Duration::from_secs(10)));
        let t0 = Instant::now();
        assert!(!engine.window_elapsed(t0));

        engine.start(t0);
        assert!(!engine.window_elapsed(t0 + Duration::from_secs(9)));
        assert!(engine.window_elapsed(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_manual_window_never_elapses() {
        let mut engine = CalibrationEngine::new(SETTLE, None);
        let t0 = Instant::now();
        engine.start(t0);
        assert!(!engine.window_elapsed(t0 + Duration::from_secs(3600)));
    }

    #[test]
    fn test_from_config() {
        let config = CalibrationConfig {
            settle_ms: 250,
            window_ms: 0,
        };
        let mut engine = CalibrationEngine::from_config(&config);
        let t0 = Instant::now();
        engine.start(t0);
        assert!(!engine.sample(&axes_report(1, 1, 1, 1), t0 + Duration::from_millis(249)));
        assert!(engine.sample(&axes_report(1, 1, 1, 1), t0 + Duration::from_millis(250)));
        assert!(!engine.window_elapsed(t0 + Duration::from_secs(60)));
    }
}
