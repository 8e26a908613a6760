//! Samplers that feed the event queue.
//!
//! Each [`Collector`] reads one category of OS metrics and turns it into
//! [`Event`]s keyed `os/<group>[/<dimension>=<value>]` whose payload is a set
//! of `name:value` lines. They are thin wrappers over `sysinfo`; everything
//! downstream only sees the queue.

pub mod cpu;
pub mod load;
pub mod memory;
pub mod network;

use anyhow::Result;
use perfmon_common::queue::EventQueue;
use perfmon_common::types::{Event, PATH_SEPARATOR};

/// Routing key shared by every OS-level event.
pub const OS_ROUTING_KEY: &str = "os";

/// A system metric sampler.
///
/// Called once per sampling interval from the agent's collection loop.
pub trait Collector: Send {
    /// Short name used in logs (e.g. `"cpu"`).
    fn name(&self) -> &str;

    /// Samples current values, stamping every event with `epoch`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system call fails.
    fn collect(&mut self, epoch: i64) -> Result<Vec<Event>>;
}

/// Builds an event key from a group and its dimension tags.
///
/// Separators inside dimension values are replaced so each tag stays a
/// single path segment.
///
/// # Examples
///
/// ```
/// use perfmon_collector::event_key;
///
/// assert_eq!(event_key("cpu", &[]), "os/cpu");
/// assert_eq!(event_key("network", &[("interface", "eth0")]), "os/network/interface=eth0");
/// assert_eq!(event_key("disk", &[("mount", "/data")]), "os/disk/mount=_data");
/// ```
pub fn event_key(group: &str, dimensions: &[(&str, &str)]) -> String {
    let mut key = format!("{OS_ROUTING_KEY}{PATH_SEPARATOR}{group}");
    for (name, value) in dimensions {
        key.push(PATH_SEPARATOR);
        key.push_str(name);
        key.push('=');
        key.push_str(&value.replace(PATH_SEPARATOR, "_"));
    }
    key
}

/// Runs every collector once and pushes the results into `queue`. A failing
/// collector is logged and skipped. Returns the number of events queued.
pub fn collect_into(collectors: &mut [Box<dyn Collector>], queue: &EventQueue, epoch: i64) -> usize {
    let mut all_events = Vec::new();
    for collector in collectors.iter_mut() {
        match collector.collect(epoch) {
            Ok(events) => all_events.extend(events),
            Err(e) => tracing::warn!(collector = collector.name(), error = %e, "Collection failed"),
        }
    }
    let count = all_events.len();
    queue.push_batch(all_events);
    count
}
