//! # Output Module
//!
//! Destination for finished XInput reports.
//!
//! The virtual-device transport lives outside this crate and plugs in behind
//! [`ReportSink`]. [`TracingSink`] stands in for it: it logs each report at
//! trace level and counts what it was given.

use tracing::trace;

use crate::controller::xinput::OutputReport;
use crate::error::Result;

/// Consumer of translated reports
#[cfg_attr(test, mockall::automock)]
pub trait ReportSink: Send {
    /// Deliver one report to the virtual controller
    fn send(&mut self, report: &OutputReport) -> Result<()>;
}

/// Sink that only logs reports
#[derive(Debug, Default)]
pub struct TracingSink {
    sent: u64,
    last: Option<OutputReport>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Most recent report received
    pub fn last(&self) -> Option<&OutputReport> {
        self.last.as_ref()
    }
}

impl ReportSink for TracingSink {
    fn send(&mut self, report: &OutputReport) -> Result<()> {
        self.sent += 1;
        self.last = Some(*report);
        trace!(
            "XInput #{}: buttons={:#06x} lt={} rt={} l=({}, {}) r=({}, {})",
            self.sent,
            report.buttons.bits(),
            report.left_trigger,
            report.right_trigger,
            report.left_stick_x,
            report.left_stick_y,
            report.right_stick_x,
            report.right_stick_y
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::xinput::Buttons;
    use crate::error::Ds4BridgeError;

    #[test]
    fn test_tracing_sink_counts_reports() {
        let mut sink = TracingSink::new();
        assert_eq!(sink.sent(), 0);
        assert!(sink.last().is_none());

        let report = OutputReport {
            buttons: Buttons::A | Buttons::DPAD_UP,
            left_stick_x: -32767,
            ..OutputReport::default()
        };
        sink.send(&report).unwrap();
        sink.send(&OutputReport::new()).unwrap();

        assert_eq!(sink.sent(), 2);
        assert!(sink.last().unwrap().is_neutral());
    }

    #[test]
    fn test_mock_sink_receives_report() {
        let mut sink = MockReportSink::new();
        sink.expect_send()
            .withf(|report| report.buttons.contains(Buttons::B))
            .times(1)
            .returning(|_| Ok(()));

        let report = OutputReport {
            buttons: Buttons::B,
            ..OutputReport::default()
        };
        assert!(sink.send(&report).is_ok());
    }

    #[test]
    fn test_mock_sink_error() {
        let mut sink = MockReportSink::new();
        sink.expect_send()
            .returning(|_| Err(Ds4BridgeError::Sink("device closed".to_string())));

        let err = sink.send(&OutputReport::new()).unwrap_err();
        assert_eq!(err.to_string(), "Output sink error: device closed");
    }
}
