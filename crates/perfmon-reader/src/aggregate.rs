use anyhow::Result;
use perfmon_common::types::{Event, PATH_SEPARATOR};
use perfmon_storage::{Dimensions, Metric, MetricsDb, SchemaRegistry, ValueType};
use std::collections::HashMap;

/// Routing key of OS-level samples.
pub const OS_ROUTING_KEY: &str = "os";

/// Collects the raw samples of one window, grouped by metric name and
/// dimension tuple, until they are reduced into a [`MetricsDb`].
#[derive(Debug, Default)]
pub struct SampleAggregator {
    samples: HashMap<String, HashMap<Dimensions, Vec<f64>>>,
    skipped: usize,
}

impl SampleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes one decoded event to the parser for its routing key.
    pub fn add(&mut self, event: &Event) {
        match event.routing_key() {
            OS_ROUTING_KEY => self.add_os_sample(event),
            other => {
                tracing::debug!(routing_key = %other, key = %event.key, "No parser for event");
                self.skipped += 1;
            }
        }
    }

    /// `os/<group>[/<dim>=<value>...]` keys with `name:value` payloads.
    fn add_os_sample(&mut self, event: &Event) {
        let mut dimensions = Dimensions::new();
        for segment in event.key.split(PATH_SEPARATOR) {
            if let Some((name, value)) = segment.split_once('=') {
                dimensions.insert(name, value);
            }
        }
        for (name, raw) in event.fields() {
            match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => self
                    .samples
                    .entry(name.to_string())
                    .or_default()
                    .entry(dimensions.clone())
                    .or_default()
                    .push(value),
                _ => {
                    tracing::debug!(key = %event.key, field = %name, value = %raw, "Unparsable sample");
                    self.skipped += 1;
                }
            }
        }
    }

    /// Number of events or fields that could not be used.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.samples.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Reduces every (metric, dimensions) group to one row and inserts it.
    /// Metrics missing from `registry` are skipped. Returns rows written.
    pub fn write_to(&self, db: &MetricsDb, registry: &SchemaRegistry) -> Result<usize> {
        let mut written = 0;
        for (name, groups) in &self.samples {
            let Some(schema) = registry.get(name) else {
                tracing::debug!(metric = %name, "Metric not in schema registry, skipping");
                continue;
            };
            db.create_metric_table(schema)?;
            let dimension_names = schema.dimension_names();

            let rows: Vec<(Dimensions, Metric<f64>)> = groups
                .iter()
                .filter_map(|(dims, values)| {
                    Metric::from_samples(name.as_str(), values).map(|m| (dims.clone(), m))
                })
                .collect();

            written += match schema.value_type {
                ValueType::Double => db.put_metrics(name, &dimension_names, &rows)?,
                ValueType::Integer => {
                    let rows: Vec<(Dimensions, Metric<i64>)> = rows
                        .into_iter()
                        .map(|(dims, m)| (dims, round_metric(m)))
                        .collect();
                    db.put_metrics(name, &dimension_names, &rows)?
                }
            };
        }
        Ok(written)
    }
}

fn round_metric(m: Metric<f64>) -> Metric<i64> {
    Metric::new(
        m.name,
        m.sum.round() as i64,
        m.avg.round() as i64,
        m.min.round() as i64,
        m.max.round() as i64,
    )
}
