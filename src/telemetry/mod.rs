//! # Telemetry Module
//!
//! Handles event logging to JSONL files with rotation.
//!
//! This module handles:
//! - Receiving translator events (battery, calibration, drift)
//! - Formatting as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files

pub mod logger;

pub use logger::EventLogger;
