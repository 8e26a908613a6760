use crate::processor::{ReaderConfig, ReaderMetricsProcessor};
use perfmon_common::clock::ManualClock;
use perfmon_common::queue::EventQueue;
use perfmon_common::types::Event;
use perfmon_eventlog::{EventLog, EventLogFileHandler, EventLogQueueProcessor, QueueProcessorConfig};
use perfmon_storage::{SchemaRegistry, StorageError, WindowStore};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

const INTERVAL: i64 = 5_000;

struct Harness {
    metrics_dir: TempDir,
    _db_dir: TempDir,
    queue: Arc<EventQueue>,
    clock: Arc<ManualClock>,
    store: Arc<WindowStore>,
    writer: EventLogQueueProcessor,
    reader: ReaderMetricsProcessor,
}

fn file_handler(dir: &TempDir) -> EventLogFileHandler {
    let log = EventLog::with_line_separator(dir.path(), "\n").unwrap();
    EventLogFileHandler::new(log, dir.path())
}

fn harness() -> Harness {
    let metrics_dir = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let queue = Arc::new(EventQueue::new(1_000));
    let clock = Arc::new(ManualClock::new(0));
    let store = Arc::new(WindowStore::new(db_dir.path(), false).unwrap());

    let writer = EventLogQueueProcessor::new(
        file_handler(&metrics_dir),
        queue.clone(),
        clock.clone(),
        Arc::new(AtomicBool::new(true)),
        QueueProcessorConfig {
            sampling_interval_ms: INTERVAL,
            purge_period_ms: INTERVAL as u64,
            initial_delay_ms: INTERVAL as u64,
        },
    );
    let reader = ReaderMetricsProcessor::new(
        file_handler(&metrics_dir),
        store.clone(),
        SchemaRegistry::builtin(),
        clock.clone(),
        ReaderConfig {
            sampling_interval_ms: INTERVAL,
            run_interval_ms: INTERVAL as u64,
            file_retention_ms: 10 * INTERVAL,
        },
    );
    Harness {
        metrics_dir,
        _db_dir: db_dir,
        queue,
        clock,
        store,
        writer,
        reader,
    }
}

#[test]
fn window_to_read_lags_two_intervals() {
    assert_eq!(ReaderMetricsProcessor::window_to_read(22_000, INTERVAL), 10_000);
    assert_eq!(ReaderMetricsProcessor::window_to_read(20_000, INTERVAL), 10_000);
}

#[test]
fn written_bucket_becomes_queryable_window() {
    let mut h = harness();
    let epoch = 100_000;
    h.queue.push_batch(vec![
        Event::new("os/cpu/core=0", "core_utilization:10", epoch),
        Event::new("os/cpu/core=0", "core_utilization:30", epoch),
        Event::new("os/cpu/core=1", "core_utilization:4", epoch),
        Event::new("os/cpu", "cpu_utilization:15", epoch),
        Event::new("os/network/interface=eth0", "net_bytes_recv:100\nnet_bytes_sent:7", epoch),
    ]);

    h.clock.set(epoch + INTERVAL + 1);
    h.writer.purge_queue_and_persist();
    h.clock.set(epoch + 2 * INTERVAL + 1);
    h.writer.purge_queue_and_persist();

    assert_eq!(h.reader.process().unwrap(), Some(epoch));
    assert_eq!(h.store.current_window(), Some(epoch));

    let cores = h
        .store
        .query_metric(&["core_utilization"], &["avg"], &["core"])
        .unwrap()
        .unwrap();
    assert_eq!(cores.row(&[Some("0")]).unwrap().metrics, vec![Some(20.0)]);
    assert_eq!(cores.row(&[Some("1")]).unwrap().metrics, vec![Some(4.0)]);

    let joined = h
        .store
        .query_metric(&["net_bytes_recv", "net_bytes_sent"], &["sum", "max"], &["interface"])
        .unwrap()
        .unwrap();
    assert_eq!(
        joined.row(&[Some("eth0")]).unwrap().metrics,
        vec![Some(100.0), Some(7.0)]
    );

    let global = h.store.query_metric(&["cpu_utilization"], &["max"], &[]).unwrap().unwrap();
    assert_eq!(global.rows[0].metrics, vec![Some(15.0)]);

    // Same window again is a no-op.
    assert_eq!(h.reader.process().unwrap(), None);
}

#[test]
fn unpublished_bucket_is_retried_later() {
    let mut h = harness();
    let epoch = 100_000;
    h.queue.push(Event::new("os/load", "load_1:0.5", epoch));
    h.clock.set(epoch + INTERVAL + 1);
    h.writer.purge_queue_and_persist();

    // The reader already looks at `epoch`, but it is still a .tmp file.
    h.clock.set(epoch + 2 * INTERVAL + 1);
    assert_eq!(h.reader.process().unwrap(), None);
    assert!(matches!(
        h.store.query_metric(&["load_1"], &["sum"], &[]),
        Err(StorageError::NoDataAvailable)
    ));

    h.writer.purge_queue_and_persist();
    assert_eq!(h.reader.process().unwrap(), Some(epoch));
}

#[test]
fn reader_ticking_before_writer_still_loads_every_window() {
    let mut h = harness();
    let mut published = Vec::new();
    for i in 0..6 {
        let now = 100_000 + i * INTERVAL;
        h.queue.push(Event::new("os/load", format!("load_1:{i}"), now));
        h.clock.set(now + 5);
        if let Some(epoch) = h.reader.process().unwrap() {
            published.push(epoch);
        }
        h.clock.set(now + 10);
        h.writer.purge_queue_and_persist();
    }

    assert_eq!(published, vec![100_000, 105_000, 110_000]);
    assert_eq!(h.store.current_window(), Some(110_000));
    assert_eq!(h.reader.next_epoch(), Some(115_000));
    let result = h.store.query_metric(&["load_1"], &["sum"], &[]).unwrap().unwrap();
    assert_eq!(result.rows[0].metrics, vec![Some(2.0)]);
}

#[test]
fn missed_cycles_are_caught_up_in_order() {
    let mut h = harness();
    h.clock.set(100_001);
    assert_eq!(h.reader.process().unwrap(), None);

    for (i, epoch) in [100_000, 105_000].into_iter().enumerate() {
        h.queue.push(Event::new("os/load", format!("load_1:{i}"), epoch));
        h.clock.set(epoch + INTERVAL + 1);
        h.writer.purge_queue_and_persist();
    }
    h.clock.set(115_001);
    h.writer.purge_queue_and_persist();

    assert_eq!(h.reader.process().unwrap(), Some(105_000));
    assert_eq!(h.store.current_window(), Some(105_000));
    assert_eq!(h.reader.next_epoch(), Some(110_000));
}

#[test]
fn newer_window_replaces_older_one() {
    let mut h = harness();
    for (i, epoch) in [100_000, 105_000].into_iter().enumerate() {
        h.queue.push(Event::new("os/load", format!("load_1:{i}"), epoch));
        h.clock.set(epoch + INTERVAL + 1);
        h.writer.purge_queue_and_persist();
    }
    h.clock.set(110_000 + INTERVAL + 1);
    h.writer.purge_queue_and_persist();

    h.clock.set(100_000 + 2 * INTERVAL + 1);
    assert_eq!(h.reader.process().unwrap(), Some(100_000));
    h.clock.set(105_000 + 2 * INTERVAL + 1);
    assert_eq!(h.reader.process().unwrap(), Some(105_000));

    let result = h.store.query_metric(&["load_1"], &["sum"], &[]).unwrap().unwrap();
    assert_eq!(result.rows[0].metrics, vec![Some(1.0)]);
}

#[test]
fn expired_bucket_files_are_deleted() {
    let mut h = harness();
    let stale = file_handler(&h.metrics_dir);
    stale.write_tmp(&[Event::new("os/load", "load_1:1", 1_000)], 1_000);
    stale.write_tmp(&[Event::new("os/load", "load_1:1", 2_000)], 2_000);
    stale.try_rotate(2_000).unwrap();

    h.clock.set(1_000_000);
    h.reader.process().unwrap();

    assert!(!stale.tmp_path(1_000).exists());
    assert!(!stale.bucket_path(2_000).exists());
}

#[test]
fn metrics_outside_the_registry_are_not_stored() {
    let mut h = harness();
    let epoch = 100_000;
    h.queue.push(Event::new("os/custom", "not_registered:3\nload_5:2", epoch));
    h.clock.set(epoch + INTERVAL + 1);
    h.writer.purge_queue_and_persist();
    h.clock.set(epoch + 2 * INTERVAL + 1);
    h.writer.purge_queue_and_persist();
    h.reader.process().unwrap();

    let names = h.store.with_current(|db| db.metric_names()).unwrap();
    assert_eq!(names, vec!["load_5"]);
}

#[tokio::test]
async fn run_loads_published_window() {
    let mut h = harness();
    let epoch = 100_000;
    h.queue.push(Event::new("os/load", "load_1:0.5", epoch));
    h.clock.set(epoch + INTERVAL + 1);
    h.writer.purge_queue_and_persist();
    h.clock.set(epoch + 2 * INTERVAL + 1);
    h.writer.purge_queue_and_persist();

    let store = h.store.clone();
    let task = tokio::spawn(h.reader.run());
    for _ in 0..100 {
        if store.current_window().is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    task.abort();
    assert_eq!(store.current_window(), Some(epoch));
}
