//! # DS4 Bridge Library
//!
//! Use a DualShock 4 as an Xbox 360 (XInput) controller.
//!
//! This library provides the translation core (report decoding, stick
//! calibration, adaptive deadzones, drift detection, battery telemetry) and
//! the host plumbing around it: `hidapi` device discovery, the polling bridge loop and
//! JSONL event telemetry.

pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod hid;
pub mod output;
pub mod telemetry;
pub mod translator;
