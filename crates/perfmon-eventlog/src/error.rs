use std::path::{Path, PathBuf};

/// Errors raised by the event log.
///
/// # Examples
///
/// ```rust
/// use perfmon_eventlog::error::EventLogError;
///
/// let err = EventLogError::MultiByteLineSeparator("\r\n".escape_debug().to_string());
/// assert!(err.to_string().contains("single byte"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// The platform line terminator is longer than one byte, which the wire
    /// format cannot represent. Fatal at construction.
    #[error("EventLog: line separator must be a single byte, got \"{0}\"")]
    MultiByteLineSeparator(String),

    /// A filesystem operation on a bucket file failed.
    #[error("EventLog: I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl EventLogError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| EventLogError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this is an I/O error caused by a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EventLogError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Convenience `Result` alias for event log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;
