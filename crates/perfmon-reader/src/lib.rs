//! Reader side of the pipeline: turns published bucket files into the
//! per-window aggregate store.
//!
//! [`processor::ReaderMetricsProcessor`] wakes up on a fixed period, reads
//! every bucket the writer has rotated since its last cycle, reduces each with
//! [`aggregate::SampleAggregator`] and publishes the result to a
//! [`perfmon_storage::WindowStore`].

pub mod aggregate;
pub mod processor;

#[cfg(test)]
mod tests;

pub use aggregate::SampleAggregator;
pub use processor::{ReaderConfig, ReaderMetricsProcessor};
