//! On-disk event log shared by the writer and reader sides of the pipeline.
//!
//! Events are encoded by [`codec::EventLog`], appended to `<epoch>.tmp`
//! bucket files and published with an atomic rename by
//! [`file_handler::EventLogFileHandler`]. The rename is the only point at
//! which the writer and the reader synchronize: a reader opens the
//! extensionless `<epoch>` file and therefore always sees a complete bucket.
//! [`processor::EventLogQueueProcessor`] drains the shared queue on a fixed
//! period and decides which bucket each event belongs to.

pub mod codec;
pub mod error;
pub mod file_handler;
pub mod processor;


pub use codec::{EventLog, EventParser, EventSink};
pub use error::{EventLogError, Result};
pub use file_handler::{EventLogFileHandler, ReadOutcome};
pub use processor::{EventLogQueueProcessor, PurgeStats, QueueProcessorConfig};
