use crate::aggregate::SampleAggregator;
use anyhow::Result;
use perfmon_common::clock::{window_start, Clock};
use perfmon_common::types::Event;
use perfmon_eventlog::{EventLogFileHandler, ReadOutcome};
use perfmon_storage::{SchemaRegistry, WindowStore};
use std::sync::Arc;
use tokio::task;
use tokio::time::{interval, Duration, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct ReaderConfig {
    pub sampling_interval_ms: i64,
    pub run_interval_ms: u64,
    /// Bucket files older than this are deleted, `.tmp` leftovers included.
    pub file_retention_ms: i64,
}

/// What happened to one bucket during a reader cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowLoad {
    Loaded,
    /// No bucket file exists for the window, or it was read before.
    Skipped,
    /// The writer still holds the `.tmp`; retry on the next cycle.
    Pending,
}

/// Builds one aggregate window per published bucket.
pub struct ReaderMetricsProcessor {
    handler: EventLogFileHandler,
    store: Arc<WindowStore>,
    registry: SchemaRegistry,
    clock: Arc<dyn Clock>,
    config: ReaderConfig,
    next_epoch: Option<i64>,
}

impl ReaderMetricsProcessor {
    pub fn new(
        handler: EventLogFileHandler,
        store: Arc<WindowStore>,
        registry: SchemaRegistry,
        clock: Arc<dyn Clock>,
        config: ReaderConfig,
    ) -> Self {
        Self {
            handler,
            store,
            registry,
            clock,
            config,
            next_epoch: None,
        }
    }

    /// Newest bucket the writer can have published by `now_ms`. The writer renames
    /// bucket `t` during the first drain of bucket `t + interval`, which
    /// happens no earlier than `t + 2 * interval`.
    pub fn window_to_read(now_ms: i64, sampling_interval_ms: i64) -> i64 {
        window_start(now_ms, sampling_interval_ms) - 2 * sampling_interval_ms
    }

    /// Runs forever on `run_interval_ms`, each cycle on the blocking pool.
    pub async fn run(self) {
        tracing::info!(
            run_interval_ms = self.config.run_interval_ms,
            metrics_dir = %self.handler.metrics_dir().display(),
            "Reader metrics processor started"
        );

        let mut tick = interval(Duration::from_millis(self.config.run_interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut processor = self;
        loop {
            tick.tick().await;
            let joined = task::spawn_blocking(move || {
                let result = processor.process();
                (processor, result)
            })
            .await;
            let (returned, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "Reader task failed, stopping");
                    return;
                }
            };
            processor = returned;
            if let Err(e) = result {
                tracing::error!(error = %e, "Reader cycle failed");
            }
        }
    }

    /// Oldest window the next cycle will try, once the first cycle ran.
    pub fn next_epoch(&self) -> Option<i64> {
        self.next_epoch
    }

    /// One reader cycle. Loads every published bucket between the last one
    /// loaded and [`window_to_read`](Self::window_to_read), oldest first.
    /// Returns the newest window published by this cycle, if any.
    pub fn process(&mut self) -> Result<Option<i64>> {
        let now = self.clock.now_millis();
        let published = self.catch_up(now);

        let cutoff = now - self.config.file_retention_ms;
        match self.handler.delete_files_older_than(cutoff) {
            Ok(removed) if removed > 0 => tracing::debug!(removed, "Removed expired bucket files"),
            Err(e) => tracing::warn!(error = %e, "Bucket file cleanup failed"),
            _ => {}
        }

        published
    }

    fn catch_up(&mut self, now: i64) -> Result<Option<i64>> {
        let interval = self.config.sampling_interval_ms;
        let target = Self::window_to_read(now, interval);
        // Anything older has been, or is about to be, removed by retention.
        let oldest = window_start(now - self.config.file_retention_ms, interval);

        let mut epoch = self.next_epoch.unwrap_or(target).max(oldest);
        let mut published = None;
        while epoch <= target {
            self.next_epoch = Some(epoch);
            match self.load_window(epoch)? {
                WindowLoad::Pending => return Ok(published),
                WindowLoad::Loaded => published = Some(epoch),
                WindowLoad::Skipped => {}
            }
            epoch += interval;
        }
        self.next_epoch = Some(epoch);
        Ok(published)
    }

    fn load_window(&mut self, epoch: i64) -> Result<WindowLoad> {
        // Checked before the open so a rename in between is never taken for
        // an empty bucket.
        if self.handler.tmp_path(epoch).exists() {
            tracing::debug!(epoch, "Bucket not published yet, will retry");
            return Ok(WindowLoad::Pending);
        }

        let mut aggregator = SampleAggregator::new();
        let outcome = self
            .handler
            .try_read(epoch, &mut |event: Event| aggregator.add(&event))?;

        match outcome {
            ReadOutcome::AlreadyProcessed => Ok(WindowLoad::Skipped),
            ReadOutcome::NotReady => {
                tracing::debug!(epoch, "No bucket for window");
                Ok(WindowLoad::Skipped)
            }
            ReadOutcome::Read(events) => {
                let db = self.store.create_window(epoch)?;
                let rows = match aggregator.write_to(&db, &self.registry) {
                    Ok(rows) => rows,
                    Err(e) => {
                        if let Err(remove_err) = db.remove() {
                            tracing::warn!(epoch, error = %remove_err, "Failed to discard partial window");
                        }
                        return Err(e);
                    }
                };
                self.store.publish(db)?;
                tracing::debug!(
                    epoch,
                    events,
                    rows,
                    skipped = aggregator.skipped(),
                    "Loaded metrics window"
                );
                Ok(WindowLoad::Loaded)
            }
        }
    }
}
