//! # XInput Output Report
//!
//! The finished report handed to the virtual Xbox 360 device.
//!
//! ## Button Bits
//!
//! | Button | Bit |
//! |--------|-----|
//! | D-Pad Up | 0x0001 |
//! | D-Pad Down | 0x0002 |
//! | D-Pad Left | 0x0004 |
//! | D-Pad Right | 0x0008 |
//! | Start | 0x0010 |
//! | Back | 0x0020 |
//! | Left Thumb | 0x0040 |
//! | Right Thumb | 0x0080 |
//! | Left Shoulder | 0x0100 |
//! | Right Shoulder | 0x0200 |
//! | A | 0x1000 |
//! | B | 0x2000 |
//! | X | 0x4000 |
//! | Y | 0x8000 |
//!
//! Sticks are signed 16-bit in `-32767..=32767`, triggers are raw 0-255.

/// Full positive stick deflection.
pub const STICK_MAX: i16 = 32767;
/// Full negative stick deflection. `-32768` is never produced so negation is safe.
pub const STICK_MIN: i16 = -32767;

bitflags::bitflags! {
    /// XInput `wButtons` flag set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Buttons: u16 {
        const DPAD_UP = 0x0001;
        const DPAD_DOWN = 0x0002;
        const DPAD_LEFT = 0x0004;
        const DPAD_RIGHT = 0x0008;
        const START = 0x0010;
        const BACK = 0x0020;
        const LEFT_THUMB = 0x0040;
        const RIGHT_THUMB = 0x0080;
        const LEFT_SHOULDER = 0x0100;
        const RIGHT_SHOULDER = 0x0200;
        const A = 0x1000;
        const B = 0x2000;
        const X = 0x4000;
        const Y = 0x8000;

        /// All four D-pad directions.
        const DPAD = Self::DPAD_UP.bits()
            | Self::DPAD_DOWN.bits()
            | Self::DPAD_LEFT.bits()
            | Self::DPAD_RIGHT.bits();
    }
}

/// Virtual Xbox 360 input state.
///
/// Owned by the translator and overwritten in place every cycle.
///
/// # Examples
///
/// ```
/// use ds4_bridge::controller::xinput::{Buttons, OutputReport};
///
/// let report = OutputReport::default();
/// assert_eq!(report.buttons, Buttons::empty());
/// assert_eq!(report.left_stick_x, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputReport {
    /// Digital buttons (`wButtons`).
    pub buttons: Buttons,
    /// Left trigger (`bLeftTrigger`), 0-255.
    pub left_trigger: u8,
    /// Right trigger (`bRightTrigger`), 0-255.
    pub right_trigger: u8,
    /// Left stick X (`sThumbLX`).
    pub left_stick_x: i16,
    /// Left stick Y (`sThumbLY`). Positive is up.
    pub left_stick_y: i16,
    /// Right stick X (`sThumbRX`).
    pub right_stick_x: i16,
    /// Right stick Y (`sThumbRY`). Positive is up.
    pub right_stick_y: i16,
}

impl OutputReport {
    /// Creates a neutral report (sticks centered, nothing pressed).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the report carries no input at all.
    #[must_use]
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }
}
