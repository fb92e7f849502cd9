//! # Translator Module
//!
//! Per-report orchestration of the controller pipeline.
//!
//! ## Flow
//!
//! ```text
//! raw report ──► calibrating? ──yes──► CalibrationEngine ──► None
//!                    │
//!                    no
//!                    ▼
//!               BatteryMonitor (throttled)
//!                    ▼
//!               Ds4Input ──► StickNormalizer ──► OutputReport
//!                    ▼
//!               DriftDetector (idle sampling)
//! ```
//!
//! Side signals are queued as [`TranslatorEvent`] values inside the call that
//! produced them. The caller drains them with [`Translator::drain_events`]
//! after each call; the queue is reused, so draining every cycle keeps the
//! steady-state path allocation-free. An undrained queue stays bounded:
//! consecutive `CalibrationUpdated` events collapse into the newest one, and
//! past [`EVENT_QUEUE_LIMIT`] the oldest event is dropped.

use serde::Serialize;
use std::time::Instant;
use tracing::{debug, trace};

use crate::config::{BatteryConfig, CalibrationConfig, Config, DriftConfig, StickConfig};
use crate::controller::battery::{BatteryMonitor, BatteryStatus};
use crate::controller::calibration::{CalibrationEngine, CalibrationTable};
use crate::controller::drift::{DriftDetector, DriftResult};
use crate::controller::mapper::{AxisId, Ds4Input};
use crate::controller::normalizer::StickNormalizer;
use crate::controller::xinput::OutputReport;

/// Pre-reserved event queue capacity.
const EVENT_CAPACITY: usize = 16;

/// Most events held between drains.
pub const EVENT_QUEUE_LIMIT: usize = 64;

/// Side signal produced while translating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranslatorEvent {
    /// Fresh battery reading (at most once per check interval).
    BatteryUpdated { status: BatteryStatus },
    /// Level dropped to or below the low threshold.
    BatteryLow { level: u8 },
    CalibrationStarted,
    /// A sample widened the in-progress table.
    CalibrationUpdated { table: CalibrationTable },
    CalibrationFinished { table: CalibrationTable },
    DriftAnalyzed { result: DriftResult },
}

/// DS4 → XInput translation session.
///
/// One instance per connected controller, owned by the polling loop.
///
/// # Examples
///
/// ```
/// use ds4_bridge::translator::{Translator, TranslatorEvent};
///
/// let mut translator = Translator::default();
/// let mut report = [0u8; 64];
/// report[1..5].copy_from_slice(&[128, 128, 128, 128]);
/// report[5] = 0x28; // Cross, D-pad released
///
/// let output = translator.translate(&report).unwrap();
/// assert_eq!(output.left_stick_x, 0);
/// assert!(output.buttons.contains(ds4_bridge::controller::xinput::Buttons::A));
///
/// let events: Vec<_> = translator.drain_events().collect();
/// assert!(matches!(events[0], TranslatorEvent::BatteryUpdated { .. }));
/// ```
#[derive(Debug, Clone)]
pub struct Translator {
    output: OutputReport,
    calibration: CalibrationEngine,
    normalizer: StickNormalizer,
    drift: DriftDetector,
    battery: BatteryMonitor,
    events: Vec<TranslatorEvent>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Translator {
    /// Creates a translator from the individual config sections.
    #[must_use]
    pub fn new(
        sticks: &StickConfig,
        calibration: &CalibrationConfig,
        drift: &DriftConfig,
        battery: &BatteryConfig,
    ) -> Self {
        Self {
            output: OutputReport::new(),
            calibration: CalibrationEngine::from_config(calibration),
            normalizer: StickNormalizer::from_config(sticks),
            drift: DriftDetector::from_config(drift),
            battery: BatteryMonitor::from_config(battery),
            events: Vec::with_capacity(EVENT_CAPACITY),
        }
    }

    /// Creates a translator from a loaded [`Config`].
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.sticks, &config.calibration, &config.drift, &config.battery)
    }

    /// Translates one report using the current time.
    ///
    /// Call [`drain_events`](Self::drain_events) after each call; see
    /// [`translate_at`](Self::translate_at).
    pub fn translate(&mut self, report: &[u8]) -> Option<&OutputReport> {
        self.translate_at(report, Instant::now())
    }

    /// Translates one report.
    ///
    /// # Returns
    ///
    /// * `None` while calibrating
    /// * the previous output, untouched, for reports too short to decode
    /// * the updated output otherwise
    ///
    /// Side signals are queued, not returned; drain them every cycle.
    pub fn translate_at(&mut self, report: &[u8], now: Instant) -> Option<&OutputReport> {
        if self.calibration.is_calibrating() {
            if self.calibration.window_elapsed(now) {
                debug!("Calibration window elapsed");
                self.stop_calibration();
            } else {
                self.calibrate_at(report, now);
                return None;
            }
        }

        let Some(input) = Ds4Input::parse(report) else {
            trace!("Short report ({} bytes), keeping previous output", report.len());
            return Some(&self.output);
        };

        if let Some(reading) = self.battery.poll(report, now) {
            self.push_event(TranslatorEvent::BatteryUpdated { status: reading.status });
            if reading.low_warning {
                self.push_event(TranslatorEvent::BatteryLow {
                    level: reading.status.level_percent,
                });
            }
        }

        self.apply(&input);

        if let Some(result) = self.drift.observe(&input, now) {
            self.push_event(TranslatorEvent::DriftAnalyzed { result });
        }

        Some(&self.output)
    }

    /// Writes the decoded input into the persistent output report.
    fn apply(&mut self, input: &Ds4Input) {
        let table = *self.calibration.table();
        let stick = |axis: AxisId| self.normalizer.normalize_axis(input.axis(axis), axis, table.get(axis));

        let left_stick_x = stick(AxisId::LeftX);
        let left_stick_y = stick(AxisId::LeftY);
        let right_stick_x = stick(AxisId::RightX);
        let right_stick_y = stick(AxisId::RightY);

        self.output = OutputReport {
            buttons: input.buttons(),
            left_trigger: input.trigger_left,
            right_trigger: input.trigger_right,
            left_stick_x,
            left_stick_y,
            right_stick_x,
            right_stick_y,
        };
        trace!("Output: {:?}", self.output);
    }

    /// Starts a calibration capture now.
    pub fn start_calibration(&mut self) {
        self.start_calibration_at(Instant::now());
    }

    /// Starts a calibration capture. Restarts a capture already in progress.
    pub fn start_calibration_at(&mut self, now: Instant) {
        self.calibration.start(now);
        self.push_event(TranslatorEvent::CalibrationStarted);
    }

    /// Ends the capture and freezes the table.
    ///
    /// Drift state is reset so the next check runs against the new
    /// calibration. Returns `None` if no capture was running.
    pub fn stop_calibration(&mut self) -> Option<CalibrationTable> {
        let table = self.calibration.stop()?;
        self.push_event(TranslatorEvent::CalibrationFinished { table });
        self.drift.reset();
        Some(table)
    }

    /// Folds one report into a running capture now.
    pub fn calibrate(&mut self, report: &[u8]) -> bool {
        self.calibrate_at(report, Instant::now())
    }

    /// Folds one report into a running capture.
    ///
    /// Returns `true` if the sample was accepted.
    pub fn calibrate_at(&mut self, report: &[u8], now: Instant) -> bool {
        if !self.calibration.sample(report, now) {
            return false;
        }
        self.push_event(TranslatorEvent::CalibrationUpdated {
            table: *self.calibration.table(),
        });
        true
    }

    /// Queues an event, collapsing an undrained `CalibrationUpdated` into
    /// its successor.
    fn push_event(&mut self, event: TranslatorEvent) {
        if let TranslatorEvent::CalibrationUpdated { .. } = event {
            if let Some(last) = self.events.last_mut() {
                if matches!(last, TranslatorEvent::CalibrationUpdated { .. }) {
                    *last = event;
                    return;
                }
            }
        }
        if self.events.len() >= EVENT_QUEUE_LIMIT {
            trace!("Event queue full, dropping oldest event");
            self.events.remove(0);
        }
        self.events.push(event);
    }

    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_calibrating()
    }

    /// The active calibration table.
    #[must_use]
    pub fn calibration_table(&self) -> &CalibrationTable {
        self.calibration.table()
    }

    /// Installs a previously captured calibration table.
    pub fn set_calibration_table(&mut self, table: CalibrationTable) {
        self.calibration.set_table(table);
    }

    /// Forgets drift samples and re-arms the one-shot check.
    pub fn clear_drift_state(&mut self) {
        self.drift.reset();
        debug!("Drift state cleared");
    }

    pub fn set_drift_detection_enabled(&mut self, enabled: bool) {
        self.drift.set_enabled(enabled);
    }

    #[must_use]
    pub fn is_drift_detection_enabled(&self) -> bool {
        self.drift.is_enabled()
    }

    /// Last battery reading, if one has been taken.
    #[must_use]
    pub fn battery_status(&self) -> Option<BatteryStatus> {
        self.battery.last_status()
    }

    /// Current output report.
    #[must_use]
    pub fn output(&self) -> &OutputReport {
        &self.output
    }

    /// Removes and yields all queued events, oldest first.
    ///
    /// Events are only released here; a caller that never drains sees at
    /// most [`EVENT_QUEUE_LIMIT`] of the newest.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, TranslatorEvent> {
        self.events.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::calibration::CalibrationEntry;
    use crate::controller::drift::DriftSeverity;
    use crate::controller::mapper::{
        DPAD_RELEASED, OFFSET_BATTERY, OFFSET_BUTTONS, OFFSET_MISC_BUTTONS,
        OFFSET_TRIGGER_LEFT, OFFSET_TRIGGER_RIGHT,
    };
    use crate::controller::xinput::Buttons;
    use std::time::Duration;

    const SETTLE: Duration = Duration::from_millis(500);

    fn report(axes: [u8; 4]) -> [u8; 64] {
        let mut r = [0u8; 64];
        r[1..5].copy_from_slice(&axes);
        r[OFFSET_BUTTONS] = DPAD_RELEASED;
        r
    }

    fn events(translator: &mut Translator) -> Vec<TranslatorEvent> {
        translator.drain_events().collect()
    }

    // ==================== Decoding Tests ====================

    #[test]
    fn test_neutral_report() {
        let mut t = Translator::default();
        let output = *t.translate(&report([128; 4])).unwrap();
        assert!(output.is_neutral());
    }

    #[test]
    fn test_buttons_and_triggers() {
        let mut t = Translator::default();
        let mut r = report([128; 4]);
        r[OFFSET_BUTTONS] = 0x80 | 0x03; // Triangle, D-pad SE
        r[OFFSET_MISC_BUTTONS] = 0x01 | 0x20; // L1, Options
        r[OFFSET_TRIGGER_LEFT] = 255;
        r[OFFSET_TRIGGER_RIGHT] = 40;

        let output = *t.translate(&r).unwrap();
        assert_eq!(
            output.buttons,
            Buttons::Y | Buttons::DPAD_RIGHT | Buttons::DPAD_DOWN | Buttons::LEFT_SHOULDER | Buttons::START
        );
        assert_eq!(output.left_trigger, 255);
        assert_eq!(output.right_trigger, 40);
    }

    #[test]
    fn test_buttons_are_not_sticky() {
        let mut t = Translator::default();
        let mut r = report([128; 4]);
        r[OFFSET_BUTTONS] = 0x20 | DPAD_RELEASED;
        assert!(t.translate(&r).unwrap().buttons.contains(Buttons::A));

        let output = *t.translate(&report([128; 4])).unwrap();
        assert!(output.buttons.is_empty());
    }

    #[test]
    fn test_y_axes_inverted_by_default() {
        let mut t = Translator::default();
        let output = *t.translate(&report([128, 0, 128, 255])).unwrap();
        assert_eq!(output.left_stick_y, 32767);
        assert_eq!(output.right_stick_y, -32767);
    }

    #[test]
    fn test_short_report_leaves_output_unchanged() {
        let mut t = Translator::default();
        let mut r = report([255, 0, 200, 30]);
        r[OFFSET_BUTTONS] = 0x10 | 0x00;
        r[OFFSET_TRIGGER_LEFT] = 99;
        let before = *t.translate(&r).unwrap();
        t.drain_events().for_each(drop);

        let after = *t.translate(&[0u8; 31]).unwrap();
        assert_eq!(before, after);

        let after = *t.translate(&[0u8; 0]).unwrap();
        assert_eq!(before, after);
        assert!(events(&mut t).is_empty());
    }

    // ==================== Calibration Tests ====================

    #[test]
    fn test_calibrating_returns_none() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        t.start_calibration_at(t0);
        assert!(t.is_calibrating());

        assert!(t.translate_at(&report([128; 4]), t0).is_none());
        assert!(t.translate_at(&report([20; 4]), t0 + SETTLE).is_none());
        assert!(t.translate_at(&[0u8; 8], t0 + SETTLE).is_none());
    }

    #[test]
    fn test_calibration_events() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        t.start_calibration_at(t0);

        // Settling: sample ignored, no update
        t.translate_at(&report([20; 4]), t0 + Duration::from_millis(100));
        assert_eq!(events(&mut t), vec![TranslatorEvent::CalibrationStarted]);

        t.translate_at(&report([20, 128, 128, 128]), t0 + SETTLE);
        let evs = events(&mut t);
        assert_eq!(evs.len(), 1);
        match evs[0] {
            TranslatorEvent::CalibrationUpdated { table } => {
                assert_eq!(table.get(AxisId::LeftX), Some(CalibrationEntry { min: 20, max: 128 }));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let table = t.stop_calibration().unwrap();
        assert_eq!(events(&mut t), vec![TranslatorEvent::CalibrationFinished { table }]);
        assert!(!t.is_calibrating());
    }

    #[test]
    fn test_undrained_calibration_updates_collapse() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        t.start_calibration_at(t0);

        for i in 0..50u8 {
            assert!(t.calibrate_at(&report([100 - i, 128, 128, 128]), t0 + SETTLE));
        }

        let evs = events(&mut t);
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[0], TranslatorEvent::CalibrationStarted);
        match evs[1] {
            TranslatorEvent::CalibrationUpdated { table } => {
                assert_eq!(table.get(AxisId::LeftX), Some(CalibrationEntry { min: 51, max: 128 }));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_undrained_queue_is_bounded() {
        let mut t = Translator::default();
        let t0 = Instant::now();

        for i in 0..100u32 {
            t.translate_at(&report([128; 4]), t0 + Duration::from_secs(3) * i);
        }

        assert_eq!(events(&mut t).len(), EVENT_QUEUE_LIMIT);
        assert!(events(&mut t).is_empty());
    }

    #[test]
    fn test_frozen_table_used_after_stop() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        t.start_calibration_at(t0);
        t.translate_at(&report([20, 128, 128, 128]), t0 + SETTLE);
        t.translate_at(&report([230, 128, 128, 128]), t0 + SETTLE);
        t.stop_calibration();

        let later = t0 + Duration::from_secs(1);
        let output = *t.translate_at(&report([20, 128, 128, 128]), later).unwrap();
        assert_eq!(output.left_stick_x, -32767);
        let output = *t.translate_at(&report([230, 128, 128, 128]), later).unwrap();
        assert_eq!(output.left_stick_x, 32767);

        // Uncaptured axes collapsed to center: any deflection saturates
        let output = *t.translate_at(&report([128, 128, 129, 128]), later).unwrap();
        assert_eq!(output.right_stick_x, 32767);
    }

    #[test]
    fn test_stop_without_start() {
        let mut t = Translator::default();
        assert!(t.stop_calibration().is_none());
        assert!(events(&mut t).is_empty());
    }

    #[test]
    fn test_calibration_window_auto_stops() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        t.start_calibration_at(t0);
        t.translate_at(&report([20, 128, 128, 128]), t0 + SETTLE);
        t.drain_events().for_each(drop);

        let output = t.translate_at(&report([20, 128, 128, 128]), t0 + Duration::from_secs(10));
        assert_eq!(output.unwrap().left_stick_x, -32767);
        assert!(!t.is_calibrating());

        let evs = events(&mut t);
        assert!(matches!(evs[0], TranslatorEvent::CalibrationFinished { .. }));
    }

    #[test]
    fn test_manual_window_waits_for_stop() {
        let config = Config {
            calibration: CalibrationConfig { settle_ms: 500, window_ms: 0 },
            ..Config::default()
        };
        let mut t = Translator::from_config(&config);
        let t0 = Instant::now();
        t.start_calibration_at(t0);
        assert!(t.translate_at(&report([128; 4]), t0 + Duration::from_secs(600)).is_none());
        assert!(t.is_calibrating());
    }

    #[test]
    fn test_restored_table() {
        let mut t = Translator::default();
        let mut table = CalibrationTable::full_range();
        table.set(AxisId::LeftX, Some(CalibrationEntry::new(100, 156)));
        t.set_calibration_table(table);

        let output = *t.translate(&report([156, 128, 128, 128])).unwrap();
        assert_eq!(output.left_stick_x, 32767);
        assert_eq!(t.calibration_table().get(AxisId::LeftX).unwrap().min, 100);
    }

    // ==================== Battery Tests ====================

    #[test]
    fn test_battery_events_throttled() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        let mut r = report([128; 4]);
        r[OFFSET_BATTERY] = 0x15;

        t.translate_at(&r, t0);
        let expected = BatteryStatus { level_percent: 50, is_charging: true };
        assert_eq!(events(&mut t), vec![TranslatorEvent::BatteryUpdated { status: expected }]);

        t.translate_at(&r, t0 + Duration::from_millis(1500));
        assert!(events(&mut t).is_empty());

        t.translate_at(&r, t0 + Duration::from_millis(2500));
        assert_eq!(events(&mut t).len(), 1);
        assert_eq!(t.battery_status(), Some(expected));
    }

    #[test]
    fn test_battery_low_event() {
        let mut t = Translator::default();
        let mut r = report([128; 4]);
        r[OFFSET_BATTERY] = 0x01;

        t.translate_at(&r, Instant::now());
        let evs = events(&mut t);
        assert_eq!(evs.len(), 2);
        assert_eq!(evs[1], TranslatorEvent::BatteryLow { level: 10 });
    }

    #[test]
    fn test_no_battery_low_while_charging() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        let mut r = report([128; 4]);
        r[OFFSET_BATTERY] = 0x11;

        t.translate_at(&r, t0);
        let evs = events(&mut t);
        assert_eq!(evs.len(), 1);
        assert!(!evs.iter().any(|e| matches!(e, TranslatorEvent::BatteryLow { .. })));

        r[OFFSET_BATTERY] = 0x01;
        t.translate_at(&r, t0 + Duration::from_secs(3));
        let evs = events(&mut t);
        assert_eq!(evs.last(), Some(&TranslatorEvent::BatteryLow { level: 10 }));
    }

    // ==================== Drift Tests ====================

    fn feed_idle(t: &mut Translator, t0: Instant, axes: [u8; 4], count: u32) {
        for i in 0..count {
            t.translate_at(&report(axes), t0 + Duration::from_millis(100) * i);
        }
    }

    fn drift_results(evs: &[TranslatorEvent]) -> Vec<DriftResult> {
        evs.iter()
            .filter_map(|e| match e {
                TranslatorEvent::DriftAnalyzed { result } => Some(*result),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_drift_event_after_idle_window() {
        let mut t = Translator::default();
        feed_idle(&mut t, Instant::now(), [140, 128, 128, 128], 30);

        let results = drift_results(&events(&mut t));
        assert_eq!(results.len(), 1);
        assert!(results[0].has_drift);
        assert!(results[0].drift_axes.has(AxisId::LeftX));
        assert_eq!(results[0].severity, DriftSeverity::Mild);
    }

    #[test]
    fn test_no_drift_while_calibrating() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        t.start_calibration_at(t0);
        for i in 0..40u32 {
            t.translate_at(&report([150; 4]), t0 + Duration::from_millis(100) * i);
        }
        assert!(drift_results(&events(&mut t)).is_empty());
    }

    #[test]
    fn test_calibration_finish_rearms_drift_check() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        feed_idle(&mut t, t0, [140, 128, 128, 128], 30);
        assert_eq!(drift_results(&events(&mut t)).len(), 1);

        let t1 = t0 + Duration::from_secs(5);
        t.start_calibration_at(t1);
        t.translate_at(&report([0; 4]), t1 + SETTLE);
        t.translate_at(&report([255; 4]), t1 + SETTLE);
        t.stop_calibration();
        t.drain_events().for_each(drop);

        feed_idle(&mut t, t1 + Duration::from_secs(1), [128; 4], 30);
        let results = drift_results(&events(&mut t));
        assert_eq!(results.len(), 1);
        assert!(!results[0].has_drift);
    }

    #[test]
    fn test_clear_drift_state_rearms_check() {
        let mut t = Translator::default();
        let t0 = Instant::now();
        feed_idle(&mut t, t0, [128, 150, 128, 128], 30);
        assert_eq!(drift_results(&events(&mut t)).len(), 1);

        feed_idle(&mut t, t0 + Duration::from_secs(5), [128, 150, 128, 128], 30);
        assert!(drift_results(&events(&mut t)).is_empty());

        t.clear_drift_state();
        feed_idle(&mut t, t0 + Duration::from_secs(10), [128, 150, 128, 128], 30);
        assert_eq!(drift_results(&events(&mut t)).len(), 1);
    }

    #[test]
    fn test_disable_drift_detection() {
        let mut t = Translator::default();
        t.set_drift_detection_enabled(false);
        assert!(!t.is_drift_detection_enabled());
        feed_idle(&mut t, Instant::now(), [160; 4], 40);
        assert!(drift_results(&events(&mut t)).is_empty());
    }

    // ==================== Event Queue Tests ====================

    #[test]
    fn test_drain_empties_queue() {
        let mut t = Translator::default();
        t.start_calibration();
        assert_eq!(t.drain_events().count(), 1);
        assert_eq!(t.drain_events().count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(TranslatorEvent::BatteryLow { level: 20 }).unwrap();
        assert_eq!(json["type"], "battery_low");
        assert_eq!(json["level"], 20);

        let json = serde_json::to_value(TranslatorEvent::CalibrationStarted).unwrap();
        assert_eq!(json["type"], "calibration_started");

        let table = CalibrationTable::full_range();
        let json = serde_json::to_value(TranslatorEvent::CalibrationFinished { table }).unwrap();
        assert_eq!(json["table"]["left_x"]["max"], 255);
    }
}
