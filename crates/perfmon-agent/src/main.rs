mod config;

use anyhow::Result;
use perfmon_collector::cpu::CpuCollector;
use perfmon_collector::load::LoadCollector;
use perfmon_collector::memory::MemoryCollector;
use perfmon_collector::network::NetworkCollector;
use perfmon_collector::{collect_into, Collector};
use perfmon_common::clock::{window_start, Clock, SystemClock};
use perfmon_common::queue::EventQueue;
use perfmon_eventlog::{EventLog, EventLogFileHandler, EventLogQueueProcessor, QueueProcessorConfig};
use perfmon_reader::{ReaderConfig, ReaderMetricsProcessor};
use perfmon_storage::{SchemaRegistry, WindowStore};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("perfmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/agent.toml".to_string());

    let config = config::AgentConfig::load(&config_path)?;
    tracing::info!(
        metrics_dir = %config.metrics_dir,
        db_dir = %config.db_dir,
        sampling_interval_ms = config.sampling_interval_ms,
        "perfmon-agent starting"
    );

    let metrics_dir = Path::new(&config.metrics_dir);
    std::fs::create_dir_all(metrics_dir)?;
    // Fails fast on platforms whose line terminator is not one byte.
    let event_log = EventLog::new(metrics_dir)?;

    let queue = Arc::new(EventQueue::new(config.queue_capacity));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let enabled = Arc::new(AtomicBool::new(config.enabled));

    let store = Arc::new(WindowStore::new(Path::new(&config.db_dir), config.keep_all_files)?);
    let orphans = store.remove_orphaned_files()?;
    if orphans > 0 {
        tracing::info!(removed = orphans, "Removed window databases from a previous run");
    }

    let writer = EventLogQueueProcessor::new(
        EventLogFileHandler::new(event_log.clone(), metrics_dir),
        queue.clone(),
        clock.clone(),
        enabled.clone(),
        QueueProcessorConfig {
            sampling_interval_ms: config.sampling_interval_ms,
            purge_period_ms: config.purge_period_ms,
            initial_delay_ms: config.initial_delay_ms,
        },
    );
    let reader = ReaderMetricsProcessor::new(
        EventLogFileHandler::new(event_log, metrics_dir),
        store.clone(),
        SchemaRegistry::builtin(),
        clock.clone(),
        ReaderConfig {
            sampling_interval_ms: config.sampling_interval_ms,
            run_interval_ms: config.reader_interval_ms,
            file_retention_ms: config.file_retention_ms,
        },
    );

    let writer_handle = tokio::spawn(writer.run());
    let reader_handle = tokio::spawn(reader.run());

    let mut collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(CpuCollector::new()),
        Box::new(MemoryCollector::new()),
        Box::new(LoadCollector::new()),
        Box::new(NetworkCollector::new()),
    ];
    let sampling_interval_ms = config.sampling_interval_ms;
    let mut tick = interval(Duration::from_millis(sampling_interval_ms as u64));

    tracing::info!(collectors = collectors.len(), "Starting collection loop");

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let epoch = window_start(clock.now_millis(), sampling_interval_ms);
                let count = collect_into(&mut collectors, &queue, epoch);
                tracing::debug!(
                    count,
                    epoch,
                    queued = queue.len(),
                    dropped = queue.dropped(),
                    "Collected metrics"
                );
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Shutting down gracefully");
                break;
            }
        }
    }

    writer_handle.abort();
    reader_handle.abort();
    if let Err(e) = store.shutdown() {
        tracing::warn!(error = %e, "Failed to close current window");
    }
    tracing::info!("Agent stopped");

    Ok(())
}
