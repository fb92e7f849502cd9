//! # Bridge Module
//!
//! The polling loop between a DS4 report source and an XInput sink.
//!
//! Each cycle reads one report, runs it through the [`Translator`], forwards
//! the result to the sink and drains the translator's events into the log and
//! the optional telemetry file. Runtime commands (calibration, drift control)
//! arrive over a channel and are applied between reports.

use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{error::Elapsed, timeout};
use tracing::{debug, info, trace, warn};

use crate::error::{Ds4BridgeError, Result};
use crate::hid::source_trait::ReportSource;
use crate::hid::REPORT_BUFFER_LEN;
use crate::output::ReportSink;
use crate::telemetry::EventLogger;
use crate::translator::{Translator, TranslatorEvent};

/// Number of forwarded reports between status log messages
const LOG_INTERVAL_REPORTS: u64 = 1000;

/// Runtime control of the translator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeCommand {
    StartCalibration,
    StopCalibration,
    ClearDrift,
    SetDriftDetection(bool),
}

impl BridgeCommand {
    /// Parses a console command.
    ///
    /// # Examples
    ///
    /// ```
    /// use ds4_bridge::bridge::BridgeCommand;
    ///
    /// assert_eq!(BridgeCommand::parse("calibrate"), Some(BridgeCommand::StartCalibration));
    /// assert_eq!(BridgeCommand::parse("drift off"), Some(BridgeCommand::SetDriftDetection(false)));
    /// assert_eq!(BridgeCommand::parse("jump"), None);
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["calibrate"] => Some(BridgeCommand::StartCalibration),
            ["stop"] => Some(BridgeCommand::StopCalibration),
            ["clear-drift"] => Some(BridgeCommand::ClearDrift),
            ["drift", "on"] => Some(BridgeCommand::SetDriftDetection(true)),
            ["drift", "off"] => Some(BridgeCommand::SetDriftDetection(false)),
            _ => None,
        }
    }
}

/// Counters for one bridge session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub reports_read: u64,
    pub reports_forwarded: u64,
    pub send_failures: u64,
}

/// Source → translator → sink loop
pub struct Bridge<S, K> {
    source: S,
    sink: K,
    translator: Translator,
    telemetry: Option<EventLogger>,
    read_timeout: Duration,
    buf: [u8; REPORT_BUFFER_LEN],
    stats: BridgeStats,
}

impl<S: ReportSource, K: ReportSink> Bridge<S, K> {
    /// Create a bridge
    ///
    /// # Arguments
    ///
    /// * `source` - Raw DS4 report source
    /// * `sink` - Destination for translated reports
    /// * `translator` - Translation session (kept across reconnects by the caller)
    /// * `read_timeout` - Longest wait for one report before re-checking commands
    pub fn new(source: S, sink: K, translator: Translator, read_timeout: Duration) -> Self {
        Self {
            source,
            sink,
            translator,
            telemetry: None,
            read_timeout,
            buf: [0; REPORT_BUFFER_LEN],
            stats: BridgeStats::default(),
        }
    }

    /// Record events to JSONL files
    pub fn with_telemetry(mut self, logger: EventLogger) -> Self {
        self.telemetry = Some(logger);
        self
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Take the bridge apart, keeping the sink, translator and telemetry for
    /// the next connection
    pub fn into_parts(self) -> (K, Translator, Option<EventLogger>) {
        (self.sink, self.translator, self.telemetry)
    }

    /// Apply one runtime command
    pub fn handle_command(&mut self, command: BridgeCommand) {
        debug!("Command: {:?}", command);
        match command {
            BridgeCommand::StartCalibration => {
                self.translator.start_calibration();
                info!("Rotate both sticks through their full range, then send `stop`");
            }
            BridgeCommand::StopCalibration => {
                if self.translator.stop_calibration().is_none() {
                    warn!("No calibration in progress");
                }
            }
            BridgeCommand::ClearDrift => self.translator.clear_drift_state(),
            BridgeCommand::SetDriftDetection(enabled) => {
                self.translator.set_drift_detection_enabled(enabled);
            }
        }
        self.flush_events();
    }

    /// Read and process a single report
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A report was processed
    /// * `Ok(false)` - No report arrived within the read timeout
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the device disconnected
    pub async fn step(&mut self) -> Result<bool> {
        let read = timeout(self.read_timeout, self.source.read_report(&mut self.buf)).await;
        self.handle_read(read)
    }

    /// Run until `shutdown` resolves or the source fails
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Shutdown was requested
    ///
    /// # Errors
    ///
    /// Returns error when the controller stops delivering reports; the caller
    /// is expected to reconnect
    pub async fn run<F>(
        &mut self,
        commands: &mut mpsc::Receiver<BridgeCommand>,
        shutdown: F,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Bridge running");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(
                        "Shutting down: {} reports read, {} forwarded",
                        self.stats.reports_read, self.stats.reports_forwarded
                    );
                    return Ok(());
                }

                Some(command) = commands.recv() => {
                    self.handle_command(command);
                }

                read = timeout(self.read_timeout, self.source.read_report(&mut self.buf)) => {
                    self.handle_read(read)?;
                }
            }
        }
    }

    fn handle_read(&mut self, read: std::result::Result<io::Result<usize>, Elapsed>) -> Result<bool> {
        let len = match read {
            Err(_) => {
                trace!("No report within {:?}", self.read_timeout);
                return Ok(false);
            }
            Ok(Ok(0)) => {
                return Err(Ds4BridgeError::Controller("Controller disconnected".to_string()));
            }
            Ok(Ok(len)) => len,
            Ok(Err(e)) => return Err(e.into()),
        };

        self.process(len);
        Ok(true)
    }

    fn process(&mut self, len: usize) {
        self.stats.reports_read += 1;

        if let Some(output) = self.translator.translate(&self.buf[..len]) {
            match self.sink.send(output) {
                Ok(()) => {
                    self.stats.reports_forwarded += 1;
                    if self.stats.reports_forwarded % LOG_INTERVAL_REPORTS == 0 {
                        debug!("Forwarded {} reports", self.stats.reports_forwarded);
                    }
                }
                Err(e) => {
                    self.stats.send_failures += 1;
                    debug!("Failed to send report: {}", e);
                }
            }
        }

        self.flush_events();
    }

    /// Logs and records queued events. Telemetry writes are small blocking
    /// file appends made inline on this task.
    fn flush_events(&mut self) {
        for event in self.translator.drain_events() {
            match &event {
                TranslatorEvent::CalibrationUpdated { .. } => trace!("Event: {:?}", event),
                _ => debug!("Event: {:?}", event),
            }

            if let Some(logger) = self.telemetry.as_mut() {
                if let Err(e) = logger.log(&event) {
                    warn!("Failed to record event: {}", e);
                }
            }
        }
    }
}
