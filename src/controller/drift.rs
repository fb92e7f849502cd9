//! # Stick Drift Detection Module
//!
//! Watches the sticks while the controller sits idle and flags axes that rest
//! away from center.
//!
//! ## Sampling
//!
//! At most one sample per `sample_interval` (100 ms) is taken, independent of
//! the poll rate. Any button press or trigger pull discards everything
//! collected so far: only an untouched controller says anything about its rest
//! position. After `window_samples` (30) idle samples the window is analyzed
//! once; the detector then stays quiet until [`DriftDetector::reset`].
//!
//! ## Analysis
//!
//! An axis with at least `min_samples` (10) samples drifts when
//!
//! - `|mean - 128| > 8`, and
//! - either `range < 6` (stable off-center rest) or more than 80% of the
//!   samples sit on one side of 128.
//!
//! The second condition separates a stick that has settled off-center from
//! one that is merely noisy around the center.
//!
//! ## Severity
//!
//! | Drifting axes | Severity |
//! |---------------|----------|
//! | 0 | None |
//! | 1 | Mild |
//! | 2 | Moderate |
//! | 3-4 | Severe |

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::mapper::{AxisId, AxisSet, Ds4Input, AXIS_CENTER};
use crate::config::DriftConfig;

/// Upper bound on samples kept per axis.
pub const SAMPLE_CAPACITY: usize = 30;

/// How many axes drift, as a user-facing category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    #[default]
    None,
    Mild,
    Moderate,
    Severe,
}

impl DriftSeverity {
    /// Severity for a number of drifting axes.
    #[must_use]
    pub fn from_axis_count(count: usize) -> Self {
        match count {
            0 => DriftSeverity::None,
            1 => DriftSeverity::Mild,
            2 => DriftSeverity::Moderate,
            _ => DriftSeverity::Severe,
        }
    }
}

impl fmt::Display for DriftSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DriftSeverity::None => "none",
            DriftSeverity::Mild => "mild",
            DriftSeverity::Moderate => "moderate",
            DriftSeverity::Severe => "severe",
        })
    }
}

/// Verdict of one analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct DriftResult {
    pub has_drift: bool,
    pub drift_axes: AxisSet,
    pub severity: DriftSeverity,
}

impl DriftResult {
    /// Builds a result from the set of drifting axes.
    #[must_use]
    pub fn from_axes(drift_axes: AxisSet) -> Self {
        Self {
            has_drift: !drift_axes.is_empty(),
            drift_axes,
            severity: DriftSeverity::from_axis_count(drift_axes.len()),
        }
    }
}

/// Summary statistics of one axis' samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStats {
    pub count: usize,
    pub mean: f32,
    pub min: u8,
    pub max: u8,
    /// Samples strictly above center.
    pub above: usize,
    /// Samples strictly below center.
    pub below: usize,
}

impl AxisStats {
    /// Computes statistics, `None` for an empty slice.
    #[must_use]
    pub fn from_samples(samples: &[u8]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sum = 0u32;
        let mut min = u8::MAX;
        let mut max = u8::MIN;
        let mut above = 0;
        let mut below = 0;
        for &s in samples {
            sum += u32::from(s);
            min = min.min(s);
            max = max.max(s);
            if s > AXIS_CENTER {
                above += 1;
            } else if s < AXIS_CENTER {
                below += 1;
            }
        }

        Some(Self {
            count: samples.len(),
            mean: sum as f32 / samples.len() as f32,
            min,
            max,
            above,
            below,
        })
    }

    #[must_use]
    pub fn range(&self) -> u8 {
        self.max - self.min
    }

    /// Distance of the mean from center.
    #[must_use]
    pub fn deviation(&self) -> f32 {
        (self.mean - f32::from(AXIS_CENTER)).abs()
    }

    /// Fraction of samples on the more populated side of center.
    #[must_use]
    pub fn one_sided_fraction(&self) -> f32 {
        self.above.max(self.below) as f32 / self.count as f32
    }
}

/// Decision thresholds for drift analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftThresholds {
    pub min_samples: usize,
    pub center_deviation: f32,
    pub stable_range: u8,
    pub one_sided_ratio: f32,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self::from_config(&DriftConfig::default())
    }
}

impl DriftThresholds {
    #[must_use]
    pub fn from_config(config: &DriftConfig) -> Self {
        Self {
            min_samples: config.min_samples,
            center_deviation: config.center_deviation,
            stable_range: config.stable_range,
            one_sided_ratio: config.one_sided_ratio,
        }
    }

    /// Applies the drift rule to one axis' samples.
    #[must_use]
    pub fn is_drifting(&self, samples: &[u8]) -> bool {
        if samples.len() < self.min_samples {
            return false;
        }
        let Some(stats) = AxisStats::from_samples(samples) else {
            return false;
        };

        stats.deviation() > self.center_deviation
            && (stats.range() < self.stable_range
                || stats.one_sided_fraction() > self.one_sided_ratio)
    }
}

/// Fixed-capacity sample store for one axis.
#[derive(Debug, Clone, Copy)]
struct SampleBuffer {
    samples: [u8; SAMPLE_CAPACITY],
    len: usize,
}

impl SampleBuffer {
    const fn new() -> Self {
        Self {
            samples: [0; SAMPLE_CAPACITY],
            len: 0,
        }
    }

    fn push(&mut self, value: u8) {
        if self.len < SAMPLE_CAPACITY {
            self.samples[self.len] = value;
            self.len += 1;
        }
    }

    fn as_slice(&self) -> &[u8] {
        &self.samples[..self.len]
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

/// Online drift sampler and analyzer.
///
/// Not thread-safe; owned by the translator.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use ds4_bridge::controller::drift::{DriftDetector, DriftSeverity};
/// use ds4_bridge::controller::mapper::{AxisId, Ds4Input};
///
/// let mut detector = DriftDetector::default();
/// let mut report = [0u8; 32];
/// report[1..5].copy_from_slice(&[140, 128, 128, 128]); // left X resting at 140
/// report[5] = 0x08;
/// let input = Ds4Input::parse(&report).unwrap();
///
/// let t0 = Instant::now();
/// let mut verdict = None;
/// for i in 0..30 {
///     verdict = detector.observe(&input, t0 + Duration::from_millis(100 * i));
/// }
/// let verdict = verdict.unwrap();
/// assert!(verdict.has_drift);
/// assert!(verdict.drift_axes.has(AxisId::LeftX));
/// assert_eq!(verdict.severity, DriftSeverity::Mild);
/// ```
#[derive(Debug, Clone)]
pub struct DriftDetector {
    buffers: [SampleBuffer; 4],
    sample_count: usize,
    window_samples: usize,
    sample_interval: Duration,
    trigger_threshold: u8,
    thresholds: DriftThresholds,
    enabled: bool,
    check_performed: bool,
    last_tick: Option<Instant>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::from_config(&DriftConfig::default())
    }
}

impl DriftDetector {
    /// Creates a detector from the `[drift]` config section.
    #[must_use]
    pub fn from_config(config: &DriftConfig) -> Self {
        Self {
            buffers: [SampleBuffer::new(); 4],
            sample_count: 0,
            window_samples: config.window_samples.clamp(1, SAMPLE_CAPACITY),
            sample_interval: Duration::from_millis(config.sample_interval_ms),
            trigger_threshold: config.trigger_activity_threshold,
            thresholds: DriftThresholds::from_config(config),
            enabled: config.enabled,
            check_performed: false,
            last_tick: None,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables sampling. Takes effect on the next observation.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("Drift detection {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
        if !enabled {
            self.clear_samples();
        }
    }

    /// True once a window has been analyzed since the last reset.
    #[must_use]
    pub fn check_performed(&self) -> bool {
        self.check_performed
    }

    /// Idle samples collected in the current window.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Samples currently held for `axis`.
    #[must_use]
    pub fn samples(&self, axis: AxisId) -> &[u8] {
        self.buffers[axis.index()].as_slice()
    }

    /// True if the user is touching anything besides the sticks.
    #[must_use]
    pub fn is_user_active(&self, input: &Ds4Input) -> bool {
        !input.buttons().is_empty() || input.any_trigger_pressed(self.trigger_threshold)
    }

    /// Feeds one decoded report.
    ///
    /// Returns a verdict when this observation completed a sampling window.
    pub fn observe(&mut self, input: &Ds4Input, now: Instant) -> Option<DriftResult> {
        if !self.enabled || self.check_performed {
            return None;
        }

        if let Some(last) = self.last_tick {
            if now.saturating_duration_since(last) < self.sample_interval {
                return None;
            }
        }
        self.last_tick = Some(now);

        if self.is_user_active(input) {
            if self.sample_count > 0 {
                debug!("Controller in use, discarding {} drift samples", self.sample_count);
            }
            self.clear_samples();
            return None;
        }

        for axis in AxisId::ALL {
            self.buffers[axis.index()].push(input.axis(axis));
        }
        self.sample_count += 1;

        if self.sample_count < self.window_samples {
            return None;
        }

        let result = self.analyze();
        self.check_performed = true;
        self.clear_samples();

        if result.has_drift {
            warn!(
                "Stick drift detected on {} ({} severity)",
                result.drift_axes, result.severity
            );
        } else {
            info!("Drift check passed, sticks rest at center");
        }
        Some(result)
    }

    /// Analyzes the samples held right now.
    #[must_use]
    pub fn analyze(&self) -> DriftResult {
        let drift_axes: AxisSet = AxisId::ALL
            .into_iter()
            .filter(|axis| self.thresholds.is_drifting(self.samples(*axis)))
            .collect();
        DriftResult::from_axes(drift_axes)
    }

    /// Forgets all samples, the sampling clock and the one-shot flag.
    ///
    /// Called after a fresh calibration or when the host clears drift state.
    pub fn reset(&mut self) {
        self.clear_samples();
        self.check_performed = false;
        self.last_tick = None;
    }

    fn clear_samples(&mut self) {
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        self.sample_count = 0;
    }
}
