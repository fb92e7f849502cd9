//! # DS4 Report Decoder Module
//!
//! This module parses raw DualShock 4 HID input reports into a structured
//! [`Ds4Input`] and maps its buttons onto the XInput [`Buttons`] layout.
//!
//! ## Report Layout
//!
//! | Offset | Content |
//! |--------|---------|
//! | 1 | Left stick X (0-255) |
//! | 2 | Left stick Y (0-255, 0 = up) |
//! | 3 | Right stick X (0-255) |
//! | 4 | Right stick Y (0-255, 0 = up) |
//! | 5 | D-pad code (low nibble) + face buttons (high nibble) |
//! | 6 | Shoulders, Share, Options, stick clicks |
//! | 8 | L2 trigger (0-255) |
//! | 9 | R2 trigger (0-255) |
//! | 12 | Battery, alternate transport |
//! | 30 | Battery status (charging bit 4, level low nibble) |
//!
//! ## Button Mapping
//!
//! | DS4 | Byte & Mask | XInput |
//! |-----|-------------|--------|
//! | Square | 5 & 0x10 | X |
//! | Cross | 5 & 0x20 | A |
//! | Circle | 5 & 0x40 | B |
//! | Triangle | 5 & 0x80 | Y |
//! | L1 | 6 & 0x01 | Left Shoulder |
//! | R1 | 6 & 0x02 | Right Shoulder |
//! | Share | 6 & 0x10 | Back |
//! | Options | 6 & 0x20 | Start |
//! | L3 | 6 & 0x40 | Left Thumb |
//! | R3 | 6 & 0x80 | Right Thumb |
//!
//! ## Usage
//!
//! ```
//! use ds4_bridge::controller::mapper::Ds4Input;
//! use ds4_bridge::controller::xinput::Buttons;
//!
//! let mut report = [0u8; 64];
//! report[1..5].copy_from_slice(&[128, 128, 128, 128]);
//! report[5] = 0x20 | 0x08; // Cross, D-pad released
//!
//! let input = Ds4Input::parse(&report).unwrap();
//! assert_eq!(input.buttons(), Buttons::A);
//! ```

use serde::{Serialize, Serializer};
use std::fmt;

use super::xinput::Buttons;

/// Minimum report length for a full decode.
pub const REPORT_MIN_LEN: usize = 32;
/// Minimum report length for reading the four stick axes.
pub const AXES_MIN_LEN: usize = 5;

/// Offset of the first stick axis (left X).
pub const OFFSET_AXES: usize = 1;
/// Offset of the D-pad + face button byte.
pub const OFFSET_BUTTONS: usize = 5;
/// Offset of the shoulder/special button byte.
pub const OFFSET_MISC_BUTTONS: usize = 6;
/// Offset of the L2 trigger.
pub const OFFSET_TRIGGER_LEFT: usize = 8;
/// Offset of the R2 trigger.
pub const OFFSET_TRIGGER_RIGHT: usize = 9;
/// Offset of the battery byte on the alternate transport.
pub const OFFSET_BATTERY_ALT: usize = 12;
/// Offset of the primary battery byte.
pub const OFFSET_BATTERY: usize = 30;

/// Raw axis center value.
pub const AXIS_CENTER: u8 = 128;

/// D-pad code reported when no direction is held.
pub const DPAD_RELEASED: u8 = 8;

/// One of the four analog stick axes.
///
/// Used as the key for all per-axis calibration and drift state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisId {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

impl AxisId {
    /// All axes in report order.
    pub const ALL: [AxisId; 4] = [AxisId::LeftX, AxisId::LeftY, AxisId::RightX, AxisId::RightY];

    /// Position of this axis in per-axis arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            AxisId::LeftX => 0,
            AxisId::LeftY => 1,
            AxisId::RightX => 2,
            AxisId::RightY => 3,
        }
    }

    /// Human readable name, e.g. "Left X".
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            AxisId::LeftX => "Left X",
            AxisId::LeftY => "Left Y",
            AxisId::RightX => "Right X",
            AxisId::RightY => "Right Y",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

bitflags::bitflags! {
    /// A set of stick axes, one bit per [`AxisId`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AxisSet: u8 {
        const LEFT_X = 1 << 0;
        const LEFT_Y = 1 << 1;
        const RIGHT_X = 1 << 2;
        const RIGHT_Y = 1 << 3;
    }
}

impl AxisSet {
    /// True if `axis` is a member.
    #[must_use]
    pub fn has(&self, axis: AxisId) -> bool {
        self.contains(axis.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bits().count_ones() as usize
    }

    /// Iterates members in [`AxisId::ALL`] order.
    pub fn axes(&self) -> impl Iterator<Item = AxisId> + '_ {
        AxisId::ALL.into_iter().filter(move |axis| self.has(*axis))
    }
}

impl From<AxisId> for AxisSet {
    fn from(axis: AxisId) -> Self {
        match axis {
            AxisId::LeftX => AxisSet::LEFT_X,
            AxisId::LeftY => AxisSet::LEFT_Y,
            AxisId::RightX => AxisSet::RIGHT_X,
            AxisId::RightY => AxisSet::RIGHT_Y,
        }
    }
}

impl FromIterator<AxisId> for AxisSet {
    fn from_iter<I: IntoIterator<Item = AxisId>>(iter: I) -> Self {
        iter.into_iter()
            .fold(AxisSet::empty(), |set, axis| set | AxisSet::from(axis))
    }
}

impl Serialize for AxisSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.axes())
    }
}

impl fmt::Display for AxisSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for axis in self.axes() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(axis.label())?;
            first = false;
        }
        Ok(())
    }
}

/// Raw state decoded from one DS4 input report.
///
/// All values are exactly as reported by the controller. Calibration and
/// scaling to XInput ranges happen in the normalizer.
///
/// # Examples
///
/// ```
/// use ds4_bridge::controller::mapper::{AxisId, Ds4Input};
///
/// let mut report = [0u8; 32];
/// report[1] = 200;
/// let input = Ds4Input::parse(&report).unwrap();
/// assert_eq!(input.axis(AxisId::LeftX), 200);
///
/// assert!(Ds4Input::parse(&report[..31]).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds4Input {
    /// Stick axes in [`AxisId::ALL`] order.
    pub axes: [u8; 4],
    /// D-pad code + face buttons (byte 5).
    pub buttons: u8,
    /// Shoulders and specials (byte 6).
    pub misc_buttons: u8,
    /// L2 analog value.
    pub trigger_left: u8,
    /// R2 analog value.
    pub trigger_right: u8,
    /// Primary battery byte (byte 30).
    pub battery: u8,
}

impl Ds4Input {
    /// Decodes a full report. Returns `None` for reports shorter than
    /// [`REPORT_MIN_LEN`].
    #[must_use]
    pub fn parse(report: &[u8]) -> Option<Self> {
        if report.len() < REPORT_MIN_LEN {
            return None;
        }

        Some(Self {
            axes: read_axes(report)?,
            buttons: report[OFFSET_BUTTONS],
            misc_buttons: report[OFFSET_MISC_BUTTONS],
            trigger_left: report[OFFSET_TRIGGER_LEFT],
            trigger_right: report[OFFSET_TRIGGER_RIGHT],
            battery: report[OFFSET_BATTERY],
        })
    }

    /// Raw value of one axis.
    #[must_use]
    pub fn axis(&self, axis: AxisId) -> u8 {
        self.axes[axis.index()]
    }

    /// D-pad compass code (0 = N ... 7 = NW, 8 = released).
    #[must_use]
    pub fn dpad_code(&self) -> u8 {
        self.buttons & 0x0F
    }

    /// Maps every digital input onto the XInput button layout.
    ///
    /// Built from scratch on every call so released buttons never stick.
    #[must_use]
    pub fn buttons(&self) -> Buttons {
        let mut out = dpad_to_buttons(self.dpad_code());

        // Face buttons
        if self.buttons & 0x10 != 0 {
            out |= Buttons::X; // Square
        }
        if self.buttons & 0x20 != 0 {
            out |= Buttons::A; // Cross
        }
        if self.buttons & 0x40 != 0 {
            out |= Buttons::B; // Circle
        }
        if self.buttons & 0x80 != 0 {
            out |= Buttons::Y; // Triangle
        }

        // Shoulders
        if self.misc_buttons & 0x01 != 0 {
            out |= Buttons::LEFT_SHOULDER;
        }
        if self.misc_buttons & 0x02 != 0 {
            out |= Buttons::RIGHT_SHOULDER;
        }

        // Specials
        if self.misc_buttons & 0x10 != 0 {
            out |= Buttons::BACK; // Share
        }
        if self.misc_buttons & 0x20 != 0 {
            out |= Buttons::START; // Options
        }
        if self.misc_buttons & 0x40 != 0 {
            out |= Buttons::LEFT_THUMB;
        }
        if self.misc_buttons & 0x80 != 0 {
            out |= Buttons::RIGHT_THUMB;
        }

        out
    }

    /// Checks if any trigger is pressed beyond a threshold.
    ///
    /// # Examples
    ///
    /// ```
    /// use ds4_bridge::controller::mapper::Ds4Input;
    ///
    /// let mut report = [0u8; 32];
    /// report[8] = 11;
    /// let input = Ds4Input::parse(&report).unwrap();
    /// assert!(input.any_trigger_pressed(10));
    /// assert!(!input.any_trigger_pressed(11));
    /// ```
    #[must_use]
    pub fn any_trigger_pressed(&self, threshold: u8) -> bool {
        self.trigger_left > threshold || self.trigger_right > threshold
    }
}

/// Reads the four stick axes from a report of at least [`AXES_MIN_LEN`] bytes.
#[must_use]
pub fn read_axes(report: &[u8]) -> Option<[u8; 4]> {
    let bytes = report.get(OFFSET_AXES..OFFSET_AXES + 4)?;
    Some([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Converts a D-pad compass code into up to two direction flags.
///
/// | Code | Direction | Flags |
/// |------|-----------|-------|
/// | 0 | N | Up |
/// | 1 | NE | Up + Right |
/// | 2 | E | Right |
/// | 3 | SE | Right + Down |
/// | 4 | S | Down |
/// | 5 | SW | Down + Left |
/// | 6 | W | Left |
/// | 7 | NW | Left + Up |
/// | other | released | none |
#[must_use]
pub fn dpad_to_buttons(code: u8) -> Buttons {
    let mut out = Buttons::empty();
    if matches!(code, 0 | 1 | 7) {
        out |= Buttons::DPAD_UP;
    }
    if matches!(code, 1..=3) {
        out |= Buttons::DPAD_RIGHT;
    }
    if matches!(code, 3..=5) {
        out |= Buttons::DPAD_DOWN;
    }
    if matches!(code, 5..=7) {
        out |= Buttons::DPAD_LEFT;
    }
    out
}
