//! Per-window aggregate store for reduced metric samples.
//!
//! Every sampling window gets its own SQLite file ([`metrics_db::MetricsDb`])
//! holding one table per metric. A table has one TEXT column per dimension
//! followed by the pre-reduced `sum`, `avg`, `min` and `max` of the window.
//! [`window::WindowStore`] owns the window currently being served and retires
//! it once a newer one is published.

pub mod db_utils;
pub mod error;
pub mod metric;
pub mod metrics_db;
pub mod schema;
pub mod window;


pub use db_utils::Aggregation;
pub use error::{Result, StorageError};
pub use metric::{Dimensions, Metric, MetricValue};
pub use metrics_db::{MetricsDb, QueryResult, QueryRow};
pub use schema::{MetricSchema, SchemaRegistry, ValueType};
pub use window::WindowStore;
