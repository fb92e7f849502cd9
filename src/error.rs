//! # Error Types
//!
//! Custom error types for DS4 Bridge using `thiserror`.
//!
//! Only the host side (device discovery, I/O, configuration, telemetry) can
//! fail. The translation core degrades to safe defaults instead of erroring.

use thiserror::Error;

/// Main error type for DS4 Bridge
#[derive(Debug, Error)]
pub enum Ds4BridgeError {
    /// No DualShock 4 found among the enumerated HID devices
    #[error("No DualShock 4 controller found")]
    ControllerNotFound,

    /// Controller access errors
    #[error("Controller error: {0}")]
    Controller(String),

    /// HID layer errors (initialisation, enumeration)
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Output sink rejected a report
    #[error("Output sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Telemetry serialization errors
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for DS4 Bridge
pub type Result<T> = std::result::Result<T, Ds4BridgeError>;
