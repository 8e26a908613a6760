use crate::codec::{EventLog, EventParser, EventSink};
use crate::error::{EventLogError, Result};
use perfmon_common::types::Event;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const TMP_SUFFIX: &str = ".tmp";
const WRITE_CHUNK_SIZE: usize = 8 * 1024;
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Result of a [`EventLogFileHandler::try_read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The epoch is not newer than the last one read; nothing was done.
    AlreadyProcessed,
    /// The bucket has not been published yet.
    NotReady,
    /// The bucket was read in full and this many events were delivered.
    Read(usize),
}

/// Owns the `<epoch>.tmp` → `<epoch>` protocol inside one metrics directory.
///
/// Writers append to `<epoch>.tmp` across as many flushes as needed and call
/// [`rotate`](Self::rotate) once the bucket is closed. Readers only ever open
/// the extensionless name.
pub struct EventLogFileHandler {
    event_log: EventLog,
    metrics_dir: PathBuf,
    parser: EventParser,
    last_processed: i64,
}

impl EventLogFileHandler {
    pub fn new(event_log: EventLog, metrics_dir: impl Into<PathBuf>) -> Self {
        let parser = event_log.parser();
        Self {
            event_log,
            metrics_dir: metrics_dir.into(),
            parser,
            last_processed: 0,
        }
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    /// Path of the published bucket file for `epoch`.
    pub fn bucket_path(&self, epoch: i64) -> PathBuf {
        self.metrics_dir.join(epoch.to_string())
    }

    /// Path of the in-progress bucket file for `epoch`.
    pub fn tmp_path(&self, epoch: i64) -> PathBuf {
        self.metrics_dir.join(format!("{epoch}{TMP_SUFFIX}"))
    }

    /// Newest epoch handed out by [`read`](Self::read), or 0.
    pub fn last_processed(&self) -> i64 {
        self.last_processed
    }

    /// Appends `events` to the bucket's temporary file. Failures are logged;
    /// a half-written `.tmp` is never visible to readers.
    pub fn write_tmp(&self, events: &[Event], epoch: i64) {
        if let Err(e) = self.try_write_tmp(events, epoch) {
            tracing::error!(epoch, count = events.len(), error = %e, "Failed to append events to bucket");
        }
    }

    pub fn try_write_tmp(&self, events: &[Event], epoch: i64) -> Result<()> {
        let path = self.tmp_path(epoch);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(EventLogError::io(&path))?;
        for event in events {
            let bytes = self.event_log.encode(event);
            for chunk in bytes.chunks(WRITE_CHUNK_SIZE) {
                file.write_all(chunk).map_err(EventLogError::io(&path))?;
            }
        }
        file.flush().map_err(EventLogError::io(&path))?;
        Ok(())
    }

    /// Publishes the bucket by renaming `<epoch>.tmp` over `<epoch>`.
    pub fn rotate(&self, epoch: i64) {
        match self.try_rotate(epoch) {
            Ok(()) => tracing::debug!(epoch, "Rotated bucket"),
            Err(e) if e.is_not_found() => {
                tracing::debug!(epoch, "No temporary file to rotate")
            }
            Err(e) => tracing::error!(epoch, error = %e, "Failed to rotate bucket"),
        }
    }

    pub fn try_rotate(&self, epoch: i64) -> Result<()> {
        let tmp = self.tmp_path(epoch);
        // rename(2) replaces the destination atomically.
        std::fs::rename(&tmp, self.bucket_path(epoch)).map_err(EventLogError::io(&tmp))
    }

    /// Streams the published bucket for `epoch` into `sink`. Does nothing for
    /// epochs at or below the last one read, or if the bucket is not there
    /// yet. Errors are logged.
    pub fn read<S: EventSink + ?Sized>(&mut self, epoch: i64, sink: &mut S) {
        match self.try_read(epoch, sink) {
            Ok(ReadOutcome::NotReady) => {
                tracing::info!(epoch, "Bucket not published yet, will retry")
            }
            Ok(_) => {}
            Err(e) => tracing::error!(epoch, error = %e, "Failed to read bucket"),
        }
    }

    pub fn try_read<S: EventSink + ?Sized>(&mut self, epoch: i64, sink: &mut S) -> Result<ReadOutcome> {
        if epoch <= self.last_processed {
            return Ok(ReadOutcome::AlreadyProcessed);
        }
        let path = self.bucket_path(epoch);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReadOutcome::NotReady),
            Err(e) => return Err(EventLogError::io(&path)(e)),
        };
        let result = self.read_file(file, &path, sink);
        self.parser.clear();
        let count = result?;
        self.last_processed = epoch;
        Ok(ReadOutcome::Read(count))
    }

    fn read_file<S: EventSink + ?Sized>(&mut self, mut file: File, path: &Path, sink: &mut S) -> Result<usize> {
        let mut chunk = [0u8; READ_BUFFER_SIZE];
        let mut count = 0;
        loop {
            let n = file.read(&mut chunk).map_err(EventLogError::io(path))?;
            if n == 0 {
                break;
            }
            count += self.parser.read(&chunk[..n], sink);
        }
        Ok(count)
    }

    /// Deletes published and temporary bucket files whose epoch is older than
    /// `cutoff_epoch`. Returns the number of files removed.
    pub fn delete_files_older_than(&self, cutoff_epoch: i64) -> Result<u32> {
        let entries = std::fs::read_dir(&self.metrics_dir).map_err(EventLogError::io(&self.metrics_dir))?;
        let mut removed = 0u32;
        for entry in entries {
            let entry = entry.map_err(EventLogError::io(&self.metrics_dir))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let stem = name.strip_suffix(TMP_SUFFIX).unwrap_or(&name);
            let Ok(epoch) = stem.parse::<i64>() else {
                continue;
            };
            if epoch >= cutoff_epoch {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove bucket file")
                }
            }
        }
        Ok(removed)
    }
}
