//! JSONL event logger with size-based rotation.
//!
//! One record per line:
//!
//! ```text
//! {"timestamp":"2026-10-19T08:30:00+00:00","event":{"type":"battery_low","level":20}}
//! ```
//!
//! Files are named `events_<YYYYmmdd_HHMMSS>.jsonl` after the time they were
//! opened, so lexical order is creation order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::translator::TranslatorEvent;

const FILE_PREFIX: &str = "events_";
const FILE_EXTENSION: &str = "jsonl";

#[derive(Serialize)]
struct EventRecord<'a> {
    timestamp: String,
    event: &'a TranslatorEvent,
}

struct OpenFile {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

/// Appends translator events to rotating JSONL files
pub struct EventLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    current: Option<OpenFile>,
}

impl std::fmt::Debug for EventLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLogger")
            .field("dir", &self.dir)
            .field("current", &self.current_file())
            .finish_non_exhaustive()
    }
}

impl EventLogger {
    /// Create a logger from the `[telemetry]` config section
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        Self::with_limits(
            &config.log_dir,
            config.max_records_per_file,
            config.max_files_to_keep,
        )
    }

    /// Create a logger writing into `dir`
    pub fn with_limits<P: AsRef<Path>>(
        dir: P,
        max_records_per_file: usize,
        max_files_to_keep: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Event telemetry logging to {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            current: None,
        })
    }

    /// Append one event stamped with the current time
    pub fn log(&mut self, event: &TranslatorEvent) -> Result<()> {
        self.log_at(event, Utc::now())
    }

    /// Append one event with an explicit timestamp
    ///
    /// The write is synchronous: one buffered JSON line plus a flush, and a
    /// file open on rotation. Callers on an async task get at most a few
    /// events per report cycle, since the translator collapses calibration
    /// updates, so the bridge calls this inline.
    pub fn log_at(&mut self, event: &TranslatorEvent, timestamp: DateTime<Utc>) -> Result<()> {
        let needs_rotation = self
            .current
            .as_ref()
            .map_or(true, |file| file.records >= self.max_records_per_file);
        if needs_rotation {
            self.rotate(timestamp)?;
        }

        let record = EventRecord {
            timestamp: timestamp.to_rfc3339(),
            event,
        };

        if let Some(file) = self.current.as_mut() {
            serde_json::to_writer(&mut file.writer, &record)?;
            file.writer.write_all(b"\n")?;
            file.writer.flush()?;
            file.records += 1;
        }
        Ok(())
    }

    /// Path of the file currently being written
    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_ref().map(|file| file.path.as_path())
    }

    /// Event files in the log directory, oldest first
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_event_file(path))
            .collect();
        files.sort();
        Ok(files)
    }

    fn rotate(&mut self, timestamp: DateTime<Utc>) -> Result<()> {
        if let Some(mut old) = self.current.take() {
            old.writer.flush()?;
            debug!("Rotating event log {} after {} records", old.path.display(), old.records);
        }

        let path = self.next_path(timestamp);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened event log {}", path.display());

        self.current = Some(OpenFile {
            path,
            writer: BufWriter::new(file),
            records: 0,
        });

        self.prune()
    }

    /// Unused file name for `timestamp`, suffixed on same-second collisions.
    fn next_path(&self, timestamp: DateTime<Utc>) -> PathBuf {
        let stamp = timestamp.format("%Y%m%d_%H%M%S").to_string();
        let base = self.dir.join(format!("{}{}.{}", FILE_PREFIX, stamp, FILE_EXTENSION));
        if !base.exists() {
            return base;
        }

        let mut n = 1u32;
        loop {
            let candidate = self
                .dir
                .join(format!("{}{}_{:03}.{}", FILE_PREFIX, stamp, n, FILE_EXTENSION));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    /// Deletes the oldest files beyond `max_files_to_keep`.
    fn prune(&self) -> Result<()> {
        let files = self.log_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        let excess = files.len() - self.max_files_to_keep;
        for path in files.iter().take(excess) {
            if Some(path.as_path()) == self.current_file() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed old event log {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        Ok(())
    }
}

fn is_event_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.starts_with(FILE_PREFIX) && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}
