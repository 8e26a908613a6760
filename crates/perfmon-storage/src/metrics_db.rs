use crate::db_utils::{self, Aggregation};
use crate::error::{Result, StorageError};
use crate::metric::{Dimensions, Metric, MetricValue};
use crate::schema::{MetricSchema, ValueType};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};

const DB_FILE_PREFIX: &str = "metricsdb_";

/// One row of a [`QueryResult`]: dimension values, then metric values in
/// request order. NULL columns come back as `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRow {
    pub dimensions: Vec<Option<String>>,
    pub metrics: Vec<Option<f64>>,
}

/// Tabular answer to [`MetricsDb::query_metric`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub rows: Vec<QueryRow>,
}

impl QueryResult {
    /// Column names: dimensions first, then metrics.
    pub fn columns(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .chain(self.metrics.iter())
            .map(String::as_str)
            .collect()
    }

    /// The row whose dimension values equal `dimensions`.
    pub fn row(&self, dimensions: &[Option<&str>]) -> Option<&QueryRow> {
        self.rows.iter().find(|r| {
            r.dimensions.len() == dimensions.len()
                && r.dimensions.iter().zip(dimensions).all(|(a, b)| a.as_deref() == *b)
        })
    }
}

/// Aggregate store for one sampling window, backed by its own SQLite file.
pub struct MetricsDb {
    conn: Connection,
    window_start: i64,
    path: PathBuf,
}

impl MetricsDb {
    /// File name used for the window starting at `window_start`.
    pub fn file_name(window_start: i64) -> String {
        format!("{DB_FILE_PREFIX}{window_start}")
    }

    /// Parses a window start back out of a database file name.
    pub fn parse_file_name(name: &str) -> Option<i64> {
        name.strip_prefix(DB_FILE_PREFIX)?.parse().ok()
    }

    pub fn open(dir: &Path, window_start: i64) -> Result<Self> {
        let path = dir.join(Self::file_name(window_start));
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        tracing::debug!(window_start, path = %path.display(), "Opened metrics database");
        Ok(Self {
            conn,
            window_start,
            path,
        })
    }

    pub fn window_start(&self) -> i64 {
        self.window_start
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the table for `metric` unless it already exists.
    pub fn create_metric<T: MetricValue>(&self, metric: &Metric<T>, dimensions: &[&str]) -> Result<()> {
        self.create_table(&metric.name, dimensions, T::VALUE_TYPE)
    }

    pub fn create_metric_table(&self, schema: &MetricSchema) -> Result<()> {
        self.create_table(&schema.name, &schema.dimension_names(), schema.value_type)
    }

    fn create_table(&self, name: &str, dimensions: &[&str], value_type: ValueType) -> Result<()> {
        self.conn
            .execute_batch(&db_utils::create_table_sql(name, dimensions, value_type))?;
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn table_columns(&self, name: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", db_utils::quote_ident(name)))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Names of every metric table in this window.
    pub fn metric_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Inserts one row into the metric's table.
    pub fn put_metric<T: MetricValue>(&self, metric: &Metric<T>, dimensions: &Dimensions) -> Result<()> {
        let names: Vec<&str> = dimensions.names().collect();
        let mut stmt = self
            .conn
            .prepare_cached(&db_utils::insert_sql(&metric.name, &names))?;
        let values: Vec<Option<&str>> = names.iter().map(|n| dimensions.get(n)).collect();
        stmt.execute(row_params(&values, metric).as_slice())?;
        Ok(())
    }

    /// Inserts many rows into one table in a single transaction, reusing one
    /// prepared statement. Dimensions a row lacks are stored as NULL.
    pub fn put_metrics<T: MetricValue>(
        &self,
        name: &str,
        dimension_names: &[&str],
        rows: &[(Dimensions, Metric<T>)],
    ) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(&db_utils::insert_sql(name, dimension_names))?;
            for (dimensions, metric) in rows {
                let values: Vec<Option<&str>> =
                    dimension_names.iter().map(|n| dimensions.get(n)).collect();
                stmt.execute(row_params(&values, metric).as_slice())?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Aggregates `metrics[i]` with `aggregations[i]`, grouped by
    /// `dimensions`, joined across metrics on the dimension values.
    ///
    /// Metrics without a table in this window contribute NULLs. Returns
    /// `Ok(None)` when none of the requested metrics has a table.
    ///
    /// # Errors
    ///
    /// [`StorageError::UnknownAggregation`] for an aggregation other than
    /// sum/avg/min/max, [`StorageError::InvalidQuery`] when the metric and
    /// aggregation lists differ in length.
    pub fn query_metric(
        &self,
        metrics: &[&str],
        aggregations: &[&str],
        dimensions: &[&str],
    ) -> Result<Option<QueryResult>> {
        if metrics.len() != aggregations.len() {
            return Err(StorageError::InvalidQuery(format!(
                "{} metrics but {} aggregations",
                metrics.len(),
                aggregations.len()
            )));
        }
        if metrics.is_empty() {
            return Err(StorageError::InvalidQuery("no metrics requested".to_string()));
        }
        let aggregations = aggregations
            .iter()
            .map(|a| a.parse::<Aggregation>())
            .collect::<Result<Vec<_>>>()?;

        let mut subqueries = Vec::with_capacity(metrics.len());
        let mut any_table = false;
        for (index, (metric, aggregation)) in metrics.iter().zip(&aggregations).enumerate() {
            if self.table_exists(metric)? {
                any_table = true;
                let columns = self.table_columns(metric)?;
                subqueries.push(db_utils::metric_subquery(
                    index,
                    metrics,
                    *aggregation,
                    dimensions,
                    &columns,
                ));
            } else {
                tracing::debug!(metric = %metric, window_start = self.window_start, "No table for metric, padding with NULL");
                subqueries.push(db_utils::null_subquery(metrics, dimensions));
            }
        }
        if !any_table {
            return Ok(None);
        }

        let sql = db_utils::union_query(&subqueries, metrics, dimensions);
        let mut stmt = self.conn.prepare(&sql)?;
        let dim_count = dimensions.len();
        let rows = stmt
            .query_map([], |row| {
                let mut dims = Vec::with_capacity(dim_count);
                for i in 0..dim_count {
                    dims.push(row.get::<_, Option<String>>(i)?);
                }
                let mut values = Vec::with_capacity(metrics.len());
                for i in 0..metrics.len() {
                    values.push(row.get::<_, Option<f64>>(dim_count + i)?);
                }
                Ok(QueryRow {
                    dimensions: dims,
                    metrics: values,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(QueryResult {
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
            rows,
        }))
    }

    /// Closes the connection, keeping the file on disk.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| StorageError::Sqlite(e))
    }

    /// Closes the connection and deletes the database file along with its
    /// WAL/SHM side files.
    pub fn remove(self) -> Result<()> {
        let path = self.path.clone();
        let window_start = self.window_start;
        self.close()?;
        std::fs::remove_file(&path)?;
        for suffix in ["-wal", "-shm"] {
            let side = PathBuf::from(format!("{}{suffix}", path.display()));
            if side.exists() {
                if let Err(e) = std::fs::remove_file(&side) {
                    tracing::warn!(path = %side.display(), error = %e, "Failed to remove side file");
                }
            }
        }
        tracing::debug!(window_start, "Removed metrics database");
        Ok(())
    }
}

fn row_params<'a, T: MetricValue>(dimensions: &'a [Option<&'a str>], metric: &'a Metric<T>) -> Vec<&'a dyn ToSql> {
    let mut params: Vec<&dyn ToSql> = dimensions.iter().map(|d| d as &dyn ToSql).collect();
    params.push(&metric.sum);
    params.push(&metric.avg);
    params.push(&metric.min);
    params.push(&metric.max);
    params
}
