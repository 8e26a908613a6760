//! Types shared by every stage of the perfmon pipeline.
//!
//! Collectors produce [`types::Event`]s into an [`queue::EventQueue`]; the
//! event log drains the queue into per-window bucket files and the reader
//! turns those files back into aggregated metric tables.

pub mod clock;
pub mod queue;
pub mod types;

#[cfg(test)]
mod tests;
