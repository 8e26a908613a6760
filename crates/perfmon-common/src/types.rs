use serde::{Deserialize, Serialize};

/// Separator between the segments of an [`Event`] key.
pub const PATH_SEPARATOR: char = '/';

/// A single sample flowing through the pipeline.
///
/// `key` is a `/`-joined path identifying what produced the sample
/// (e.g. `os/cpu/core=0`), `value` holds one or more newline-separated
/// `name:value` pairs and `epoch` is the millisecond start of the window the
/// sample belongs to.
///
/// # Examples
///
/// ```
/// use perfmon_common::types::Event;
///
/// let event = Event::new("os/cpu/core=0", "cpu_utilization:12.5", 5000);
/// assert_eq!(event.routing_key(), "os");
/// assert_eq!(event.epoch, 5000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub key: String,
    pub value: String,
    pub epoch: i64,
}

impl Event {
    pub fn new(key: impl Into<String>, value: impl Into<String>, epoch: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            epoch,
        }
    }

    /// First path segment of the key, used to pick the handler for the event.
    pub fn routing_key(&self) -> &str {
        self.key
            .split(PATH_SEPARATOR)
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    /// Iterates the `name:value` pairs of the payload, skipping lines that do
    /// not contain a `:`.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.value.lines().filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim(), value.trim()))
        })
    }
}

/// Builds an event payload from `name:value` pairs.
///
/// # Examples
///
/// ```
/// use perfmon_common::types::format_fields;
///
/// let payload = format_fields(&[("used", 10.0), ("free", 2.5)]);
/// assert_eq!(payload, "used:10\nfree:2.5");
/// ```
pub fn format_fields(fields: &[(&str, f64)]) -> String {
    let pairs: Vec<String> = fields.iter().map(|(k, v)| format!("{k}:{v}")).collect();
    pairs.join("\n")
}
