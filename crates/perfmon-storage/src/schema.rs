use serde::Serialize;
use std::collections::HashMap;

/// Storage type of a metric table's aggregate columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Double,
    Integer,
}

impl ValueType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ValueType::Double => "DOUBLE",
            ValueType::Integer => "BIGINT",
        }
    }
}

/// Column layout of one metric table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSchema {
    pub name: String,
    pub dimensions: Vec<String>,
    pub value_type: ValueType,
}

impl MetricSchema {
    pub fn new(name: &str, dimensions: &[&str], value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            value_type,
        }
    }

    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(String::as_str).collect()
    }
}

/// Metric name → table layout, consulted whenever a table is created so the
/// columns never depend on what a particular sample happened to carry.
///
/// # Examples
///
/// ```
/// use perfmon_storage::{MetricSchema, SchemaRegistry, ValueType};
///
/// let mut registry = SchemaRegistry::builtin();
/// assert_eq!(registry.get("core_utilization").unwrap().dimensions, vec!["core"]);
///
/// registry.register(MetricSchema::new("gc_time", &["pool"], ValueType::Integer));
/// assert!(registry.get("gc_time").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, MetricSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the metrics emitted by the bundled collectors.
    pub fn builtin() -> Self {
        use ValueType::{Double, Integer};

        let mut registry = Self::new();
        for schema in [
            MetricSchema::new("cpu_utilization", &[], Double),
            MetricSchema::new("core_utilization", &["core"], Double),
            MetricSchema::new("memory_total", &[], Integer),
            MetricSchema::new("memory_used", &[], Integer),
            MetricSchema::new("memory_available", &[], Integer),
            MetricSchema::new("swap_used", &[], Integer),
            MetricSchema::new("load_1", &[], Double),
            MetricSchema::new("load_5", &[], Double),
            MetricSchema::new("load_15", &[], Double),
            MetricSchema::new("net_bytes_recv", &["interface"], Integer),
            MetricSchema::new("net_bytes_sent", &["interface"], Integer),
            MetricSchema::new("net_packets_recv", &["interface"], Integer),
            MetricSchema::new("net_packets_sent", &["interface"], Integer),
        ] {
            registry.register(schema);
        }
        registry
    }

    /// Adds or replaces the schema for `schema.name`.
    pub fn register(&mut self, schema: MetricSchema) {
        self.schemas.insert(schema.name.clone(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&MetricSchema> {
        self.schemas.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSchema> {
        self.schemas.values()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
