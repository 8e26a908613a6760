/// Errors that can occur within the metrics store.
///
/// # Examples
///
/// ```rust
/// use perfmon_storage::error::StorageError;
///
/// let err = StorageError::UnknownAggregation("median".to_string());
/// assert!(err.to_string().contains("median"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The query asked for an aggregation other than sum, avg, min or max.
    #[error("Storage: unknown aggregation type '{0}'")]
    UnknownAggregation(String),

    /// The query arguments are inconsistent (e.g. metric and aggregation
    /// lists of different lengths).
    #[error("Storage: invalid query: {0}")]
    InvalidQuery(String),

    /// No window has been published yet, so there is nothing to query.
    #[error("Storage: no data available")]
    NoDataAvailable,

    /// The metric name is not part of the schema registry.
    #[error("Storage: unknown metric '{0}'")]
    UnknownMetric(String),

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Creating or deleting a window database file failed.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
