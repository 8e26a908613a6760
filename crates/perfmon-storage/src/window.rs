use crate::error::{Result, StorageError};
use crate::metrics_db::{MetricsDb, QueryResult};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Holds the window currently being served.
///
/// New windows are built off to the side with [`WindowStore::create_window`]
/// and swapped in by [`WindowStore::publish`]; the superseded window is closed
/// and, unless `keep_all_files` is set, its file deleted.
pub struct WindowStore {
    db_dir: PathBuf,
    keep_all_files: bool,
    current: Mutex<Option<MetricsDb>>,
}

impl WindowStore {
    pub fn new(db_dir: &Path, keep_all_files: bool) -> Result<Self> {
        std::fs::create_dir_all(db_dir)?;
        Ok(Self {
            db_dir: db_dir.to_path_buf(),
            keep_all_files,
            current: Mutex::new(None),
        })
    }

    /// Lock the current window, recovering from a poisoned Mutex if necessary.
    fn lock_current(&self) -> MutexGuard<'_, Option<MetricsDb>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn keep_all_files(&self) -> bool {
        self.keep_all_files
    }

    /// Opens an unpublished database for `window_start`.
    pub fn create_window(&self, window_start: i64) -> Result<MetricsDb> {
        MetricsDb::open(&self.db_dir, window_start)
    }

    /// Makes `db` the current window and retires the previous one. A window
    /// older than the current one is retired immediately instead.
    pub fn publish(&self, db: MetricsDb) -> Result<()> {
        let retired = {
            let mut current = self.lock_current();
            match current.as_ref() {
                Some(cur) if cur.window_start() >= db.window_start() => {
                    tracing::warn!(
                        current = cur.window_start(),
                        offered = db.window_start(),
                        "Ignoring window that is not newer than the current one"
                    );
                    Some(db)
                }
                _ => {
                    tracing::info!(window_start = db.window_start(), "Published metrics window");
                    current.replace(db)
                }
            }
        };
        match retired {
            Some(old) => self.retire(old),
            None => Ok(()),
        }
    }

    fn retire(&self, db: MetricsDb) -> Result<()> {
        if self.keep_all_files {
            db.close()
        } else {
            db.remove()
        }
    }

    pub fn current_window(&self) -> Option<i64> {
        self.lock_current().as_ref().map(MetricsDb::window_start)
    }

    /// Runs `f` against the current window.
    pub fn with_current<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&MetricsDb) -> Result<R>,
    {
        let current = self.lock_current();
        let db = current.as_ref().ok_or(StorageError::NoDataAvailable)?;
        f(db)
    }

    /// Queries the current window. See [`MetricsDb::query_metric`].
    ///
    /// # Errors
    ///
    /// [`StorageError::NoDataAvailable`] while no window has been published.
    pub fn query_metric(
        &self,
        metrics: &[&str],
        aggregations: &[&str],
        dimensions: &[&str],
    ) -> Result<Option<QueryResult>> {
        self.with_current(|db| db.query_metric(metrics, aggregations, dimensions))
    }

    /// Deletes database files left behind by an earlier process. Does
    /// nothing when `keep_all_files` is set.
    pub fn remove_orphaned_files(&self) -> Result<u32> {
        if self.keep_all_files {
            return Ok(0);
        }
        let current = self.current_window();
        let mut removed = 0u32;
        for entry in std::fs::read_dir(&self.db_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let base = name
                .strip_suffix("-wal")
                .or_else(|| name.strip_suffix("-shm"))
                .unwrap_or(&name);
            let Some(window_start) = MetricsDb::parse_file_name(base) else {
                continue;
            };
            if Some(window_start) == current {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove orphaned database file")
                }
            }
        }
        Ok(removed)
    }

    /// Closes the current window. Its file is kept or deleted per
    /// `keep_all_files`.
    pub fn shutdown(&self) -> Result<()> {
        let current = self.lock_current().take();
        match current {
            Some(db) => self.retire(db),
            None => Ok(()),
        }
    }
}
