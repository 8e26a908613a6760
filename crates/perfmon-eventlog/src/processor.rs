use crate::file_handler::EventLogFileHandler;
use perfmon_common::clock::{window_start, Clock};
use perfmon_common::queue::EventQueue;
use perfmon_common::types::Event;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Timing knobs for [`EventLogQueueProcessor`].
#[derive(Debug, Clone, Copy)]
pub struct QueueProcessorConfig {
    pub sampling_interval_ms: i64,
    pub purge_period_ms: u64,
    /// Delay before the first drain; at least one sampling period so the
    /// first run has data.
    pub initial_delay_ms: u64,
}

/// What a single drain did with the events it took off the queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeStats {
    pub time_bucket: i64,
    pub current: usize,
    pub next: usize,
    pub unexpected: usize,
    pub discarded: usize,
    pub rotated: Option<i64>,
    /// The previous run's "next" bucket, published because the clock moved
    /// past it without a drain in between.
    pub rotated_skipped: Option<i64>,
}

/// Periodically drains the shared queue into bucket files.
///
/// A run files each event under the bucket one sampling interval behind
/// "now" (or the one after it, for collectors running slightly ahead) and
/// publishes the previous bucket once a new one starts, so late arrivals
/// still land in the right `.tmp` before it is renamed.
pub struct EventLogQueueProcessor {
    handler: EventLogFileHandler,
    queue: Arc<EventQueue>,
    clock: Arc<dyn Clock>,
    enabled: Arc<AtomicBool>,
    config: QueueProcessorConfig,
    last_time_bucket: i64,
}

impl EventLogQueueProcessor {
    pub fn new(
        handler: EventLogFileHandler,
        queue: Arc<EventQueue>,
        clock: Arc<dyn Clock>,
        enabled: Arc<AtomicBool>,
        config: QueueProcessorConfig,
    ) -> Self {
        Self {
            handler,
            queue,
            clock,
            enabled,
            config,
            last_time_bucket: 0,
        }
    }

    pub fn last_time_bucket(&self) -> i64 {
        self.last_time_bucket
    }

    pub fn handler(&self) -> &EventLogFileHandler {
        &self.handler
    }

    /// Bucket whose data is complete at `now_ms`: one full interval back.
    pub fn time_bucket(now_ms: i64, sampling_interval_ms: i64) -> i64 {
        window_start(now_ms, sampling_interval_ms) - sampling_interval_ms
    }

    /// Runs forever on `purge_period_ms`, starting after `initial_delay_ms`.
    /// Drains run on the blocking pool and always finish, even when the
    /// task is aborted.
    pub async fn run(self) {
        tracing::info!(
            sampling_interval_ms = self.config.sampling_interval_ms,
            purge_period_ms = self.config.purge_period_ms,
            initial_delay_ms = self.config.initial_delay_ms,
            metrics_dir = %self.handler.metrics_dir().display(),
            "Event log queue processor started"
        );

        let start = Instant::now() + Duration::from_millis(self.config.initial_delay_ms);
        let mut tick = interval_at(start, Duration::from_millis(self.config.purge_period_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut processor = self;
        loop {
            tick.tick().await;
            let joined = task::spawn_blocking(move || {
                let stats = processor.purge_queue_and_persist();
                (processor, stats)
            })
            .await;
            let stats = match joined {
                Ok((returned, stats)) => {
                    processor = returned;
                    stats
                }
                Err(e) => {
                    tracing::error!(error = %e, "Queue drain task failed, stopping");
                    return;
                }
            };
            tracing::debug!(
                bucket = stats.time_bucket,
                current = stats.current,
                next = stats.next,
                unexpected = stats.unexpected,
                "Drained event queue"
            );
        }
    }

    /// One drain cycle.
    pub fn purge_queue_and_persist(&mut self) -> PurgeStats {
        let drained = self.queue.drain();

        if !self.enabled.load(Ordering::Acquire) {
            // Keep nothing around that would be stale once re-enabled.
            return PurgeStats {
                discarded: drained.len(),
                ..PurgeStats::default()
            };
        }

        let interval = self.config.sampling_interval_ms;
        let time_bucket = Self::time_bucket(self.clock.now_millis(), interval);
        let next_time_bucket = time_bucket + interval;

        let mut curr_metrics: Vec<Event> = Vec::new();
        let mut next_metrics: Vec<Event> = Vec::new();
        let mut unexpected = 0usize;
        for event in drained {
            if event.epoch == time_bucket {
                curr_metrics.push(event);
            } else if event.epoch == next_time_bucket {
                next_metrics.push(event);
            } else {
                tracing::debug!(
                    key = %event.key,
                    epoch = event.epoch,
                    expected = time_bucket,
                    "Dropping event outside the current window"
                );
                unexpected += 1;
            }
        }
        if unexpected > 0 {
            tracing::warn!(
                count = unexpected,
                bucket = time_bucket,
                "Dropped events with unexpected epochs"
            );
        }

        let mut rotated = None;
        let mut rotated_skipped = None;
        if self.last_time_bucket != 0 && self.last_time_bucket != time_bucket {
            self.handler.rotate(self.last_time_bucket);
            rotated = Some(self.last_time_bucket);

            // A stalled drain can leave the old "next" bucket behind too.
            let skipped = self.last_time_bucket + interval;
            if skipped < time_bucket {
                tracing::warn!(
                    bucket = skipped,
                    current = time_bucket,
                    "Drain skipped a bucket, publishing it late"
                );
                self.handler.rotate(skipped);
                rotated_skipped = Some(skipped);
            }
        }

        if !curr_metrics.is_empty() {
            self.handler.write_tmp(&curr_metrics, time_bucket);
        }
        if !next_metrics.is_empty() {
            self.handler.write_tmp(&next_metrics, next_time_bucket);
        }

        self.last_time_bucket = time_bucket;

        PurgeStats {
            time_bucket,
            current: curr_metrics.len(),
            next: next_metrics.len(),
            unexpected,
            discarded: 0,
            rotated,
            rotated_skipped,
        }
    }
}
