//! # HID Module
//!
//! Finds and opens a DualShock 4 through `hidapi`.
//!
//! This module handles:
//! - Enumerating HID devices and matching the Sony DS4 vendor/product IDs
//! - Classifying the connection (USB or Bluetooth) from the bus type
//! - Retrying discovery while the controller is not yet plugged in
//! - Reading raw input reports without blocking the async runtime

pub mod source_trait;

use async_trait::async_trait;
use hidapi::{BusType, HidApi, HidDevice};
use std::ffi::CString;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::error::{Ds4BridgeError, Result};
use source_trait::ReportSource;

/// Sony Interactive Entertainment vendor ID
pub const SONY_VENDOR_ID: u16 = 0x054C;

/// DualShock 4 product IDs (v1, v2, wireless adapter)
pub const DS4_PRODUCT_IDS: &[u16] = &[0x05C4, 0x09CC, 0x0BA0];

/// Largest DS4 input report (Bluetooth extended report)
pub const REPORT_BUFFER_LEN: usize = 78;

/// Upper bound for one blocking `read_timeout` call.
///
/// Kept well under the bridge read timeout so a cancelled read gives up its
/// blocking thread quickly.
const HID_POLL_MS: i32 = 20;

/// How the controller is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Usb,
    Bluetooth,
    Unknown,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionType::Usb => "USB",
            ConnectionType::Bluetooth => "Bluetooth",
            ConnectionType::Unknown => "unknown",
        })
    }
}

impl From<BusType> for ConnectionType {
    fn from(bus: BusType) -> Self {
        match bus {
            BusType::Usb => ConnectionType::Usb,
            BusType::Bluetooth => ConnectionType::Bluetooth,
            _ => ConnectionType::Unknown,
        }
    }
}

/// One enumerated HID device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub connection: ConnectionType,
}

impl DeviceInfo {
    /// True for a Sony DualShock 4.
    ///
    /// # Examples
    ///
    /// ```
    /// use ds4_bridge::hid::{ConnectionType, DeviceInfo};
    ///
    /// let info = DeviceInfo {
    ///     path: "/dev/hidraw0".to_string(),
    ///     vendor_id: 0x054C,
    ///     product_id: 0x09CC,
    ///     connection: ConnectionType::Usb,
    /// };
    /// assert!(info.is_ds4());
    /// ```
    #[must_use]
    pub fn is_ds4(&self) -> bool {
        self.vendor_id == SONY_VENDOR_ID && DS4_PRODUCT_IDS.contains(&self.product_id)
    }
}

impl From<&hidapi::DeviceInfo> for DeviceInfo {
    fn from(info: &hidapi::DeviceInfo) -> Self {
        Self {
            path: info.path().to_string_lossy().into_owned(),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            connection: info.bus_type().into(),
        }
    }
}

/// Keeps the DS4s, sorted by path with duplicate interfaces dropped.
pub fn select_ds4<I>(devices: I) -> Vec<DeviceInfo>
where
    I: IntoIterator<Item = DeviceInfo>,
{
    let mut found: Vec<DeviceInfo> = devices
        .into_iter()
        .filter(|device| {
            let ds4 = device.is_ds4();
            if !ds4 {
                debug!(
                    "Skipping {} ({:04x}:{:04x}): not a DS4",
                    device.path, device.vendor_id, device.product_id
                );
            }
            ds4
        })
        .collect();

    found.sort_by(|a, b| a.path.cmp(&b.path));
    found.dedup_by(|a, b| a.path == b.path);
    found
}

fn enumerate(api: &HidApi) -> Vec<DeviceInfo> {
    let devices = select_ds4(api.device_list().map(DeviceInfo::from));
    for device in &devices {
        debug!(
            "Found DS4 at {} ({:04x}:{:04x}, {})",
            device.path, device.vendor_id, device.product_id, device.connection
        );
    }
    devices
}

/// Lists every DS4 the HID layer can see.
///
/// Enumeration walks the OS device tree, so it runs on the blocking pool.
///
/// # Errors
///
/// Returns error if the HID API cannot be initialised
pub async fn scan_devices() -> Result<Vec<DeviceInfo>> {
    run_blocking(|| {
        let api = HidApi::new()?;
        Ok(enumerate(&api))
    })
    .await
}

/// Runs blocking HID work on tokio's blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Ds4BridgeError::Controller(format!("HID task failed: {}", e)))?
}

fn open_blocking(api: &HidApi, path: &str) -> Result<HidDevice> {
    let c_path = CString::new(path)
        .map_err(|_| Ds4BridgeError::Controller(format!("Invalid device path {:?}", path)))?;
    api.open_path(&c_path)
        .map_err(|e| Ds4BridgeError::Controller(format!("Failed to open {}: {}", path, e)))
}

/// One discovery attempt: enumerate, then open the first DS4 that accepts us.
fn connect_blocking() -> Result<Option<(HidDevice, DeviceInfo)>> {
    let api = HidApi::new()?;
    for info in enumerate(&api) {
        match open_blocking(&api, &info.path) {
            Ok(device) => return Ok(Some((device, info))),
            Err(e) => warn!("{}", e),
        }
    }
    Ok(None)
}

fn io_error<E: fmt::Display>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

/// Connected DualShock 4
pub struct Ds4Device {
    device: Arc<Mutex<HidDevice>>,
    path: String,
    connection: ConnectionType,
}

impl fmt::Debug for Ds4Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ds4Device")
            .field("path", &self.path)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Ds4Device {
    /// Open the controller named in the config, or auto-detect one
    ///
    /// # Errors
    ///
    /// Returns `ControllerNotFound` if discovery runs out of attempts, or a
    /// controller error if the device cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ds4_bridge::config::ControllerConfig;
    /// use ds4_bridge::hid::Ds4Device;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let device = Ds4Device::open(&ControllerConfig::default()).await?;
    ///     println!("Connected to {}", device.path());
    ///     Ok(())
    /// }
    /// ```
    pub async fn open(config: &ControllerConfig) -> Result<Self> {
        if !config.device_path.is_empty() {
            return Self::open_path(&config.device_path, ConnectionType::Unknown).await;
        }

        Self::discover(
            config.max_retry_attempts,
            Duration::from_millis(config.retry_delay_ms),
        )
        .await
    }

    /// Scan for a DS4, retrying up to `max_attempts` times
    pub async fn discover(max_attempts: u32, retry_delay: Duration) -> Result<Self> {
        for attempt in 1..=max_attempts {
            match run_blocking(connect_blocking).await {
                Ok(Some((device, info))) => {
                    return Ok(Self::connected(device, info.path, info.connection));
                }
                Ok(None) => {}
                Err(e) => warn!("HID scan failed: {}", e),
            }

            if attempt < max_attempts {
                debug!(
                    "No DS4 found (attempt {}/{}), retrying in {:?}",
                    attempt, max_attempts, retry_delay
                );
                tokio::time::sleep(retry_delay).await;
            }
        }

        Err(Ds4BridgeError::ControllerNotFound)
    }

    /// Open a specific HID device path
    pub async fn open_path(path: &str, connection: ConnectionType) -> Result<Self> {
        let owned = path.to_string();
        let device = run_blocking(move || {
            let api = HidApi::new()?;
            open_blocking(&api, &owned)
        })
        .await?;

        Ok(Self::connected(device, path.to_string(), connection))
    }

    fn connected(device: HidDevice, path: String, connection: ConnectionType) -> Self {
        info!("Opened DS4 at {} ({})", path, connection);
        Self {
            device: Arc::new(Mutex::new(device)),
            path,
            connection,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn connection_type(&self) -> ConnectionType {
        self.connection
    }
}

#[async_trait]
impl ReportSource for Ds4Device {
    /// Waits for the next input report.
    ///
    /// Each poll is a short `read_timeout` on the blocking pool. A poll that
    /// times out returns 0 bytes, which is not end-of-stream, so it polls
    /// again.
    async fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len();
        loop {
            let device = Arc::clone(&self.device);
            let (report, n) = tokio::task::spawn_blocking(move || {
                let mut report = vec![0u8; len];
                let device = device.lock().map_err(|_| io_error("HID device lock poisoned"))?;
                let n = device.read_timeout(&mut report, HID_POLL_MS).map_err(io_error)?;
                Ok::<_, io::Error>((report, n))
            })
            .await
            .map_err(io_error)??;

            if n > 0 {
                buf[..n].copy_from_slice(&report[..n]);
                return Ok(n);
            }
        }
    }
}
