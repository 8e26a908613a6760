use crate::schema::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric types a metric table can hold.
pub trait MetricValue: rusqlite::ToSql + Copy + PartialOrd + Send + 'static {
    const VALUE_TYPE: ValueType;
}

impl MetricValue for f64 {
    const VALUE_TYPE: ValueType = ValueType::Double;
}

impl MetricValue for i64 {
    const VALUE_TYPE: ValueType = ValueType::Integer;
}

/// Dimension name → value tags of a sample.
///
/// # Examples
///
/// ```
/// use perfmon_storage::Dimensions;
///
/// let dims = Dimensions::new().with("index", "orders").with("shard", "0");
/// assert_eq!(dims.get("shard"), Some("0"));
/// assert_eq!(dims.names().collect::<Vec<_>>(), vec!["index", "shard"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dimensions(BTreeMap<String, String>);

impl Dimensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets a dimension, replacing any previous value for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The four reductions stored per metric row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric<T> {
    pub name: String,
    pub sum: T,
    pub avg: T,
    pub min: T,
    pub max: T,
}

impl<T: MetricValue> Metric<T> {
    pub fn new(name: impl Into<String>, sum: T, avg: T, min: T, max: T) -> Self {
        Self {
            name: name.into(),
            sum,
            avg,
            min,
            max,
        }
    }

    /// A single observation: every reduction equals `value`.
    pub fn single(name: impl Into<String>, value: T) -> Self {
        Self::new(name, value, value, value, value)
    }

    /// Checks `min <= avg <= max`.
    pub fn is_consistent(&self) -> bool {
        self.min <= self.avg && self.avg <= self.max
    }
}

impl Metric<f64> {
    /// Reduces raw samples into one row. Returns `None` for no samples.
    ///
    /// # Examples
    ///
    /// ```
    /// use perfmon_storage::Metric;
    ///
    /// let m = Metric::from_samples("cpu", &[1.0, 2.0, 6.0]).unwrap();
    /// assert_eq!((m.sum, m.avg, m.min, m.max), (9.0, 3.0, 1.0, 6.0));
    /// ```
    pub fn from_samples(name: impl Into<String>, samples: &[f64]) -> Option<Self> {
        let (&first, rest) = samples.split_first()?;
        let (mut sum, mut min, mut max) = (first, first, first);
        for &v in rest {
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let avg = sum / samples.len() as f64;
        Some(Self::new(name, sum, avg, min, max))
    }
}
