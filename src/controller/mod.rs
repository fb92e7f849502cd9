//! # Controller Module
//!
//! DualShock 4 input translation.
//!
//! This module handles:
//! - Decoding raw DS4 HID reports (sticks, buttons, D-pad, triggers)
//! - Capturing stick calibration
//! - Normalizing sticks with an adaptive deadzone
//! - Detecting stick drift while the controller is idle
//! - Extracting battery telemetry
//! - The XInput report handed to the virtual device

pub mod battery;
pub mod calibration;
pub mod drift;
pub mod mapper;
pub mod normalizer;
pub mod xinput;
