//! Trait abstraction for report input to enable testing

use async_trait::async_trait;
use std::io;

/// Trait for reading raw HID input reports
#[async_trait]
pub trait ReportSource: Send {
    /// Read one input report into `buf`, returning its length.
    ///
    /// A return of `Ok(0)` means the device went away. Errors are fatal for
    /// the current connection.
    async fn read_report(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}
