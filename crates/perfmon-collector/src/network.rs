use crate::{event_key, Collector};
use anyhow::Result;
use perfmon_common::types::{format_fields, Event};
use std::collections::HashMap;
use sysinfo::Networks;

/// Per-interface traffic since the previous sample.
pub struct NetworkCollector {
    networks: Networks,
    prev: HashMap<String, [u64; 4]>,
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            prev: HashMap::new(),
        }
    }
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for NetworkCollector {
    fn name(&self) -> &str {
        "network"
    }

    fn collect(&mut self, epoch: i64) -> Result<Vec<Event>> {
        self.networks.refresh();
        let mut events = Vec::new();

        for (name, data) in self.networks.iter() {
            let totals = [
                data.total_received(),
                data.total_transmitted(),
                data.total_packets_received(),
                data.total_packets_transmitted(),
            ];
            // First sample of an interface reports zero traffic.
            let prev = self.prev.insert(name.clone(), totals).unwrap_or(totals);
            let delta: Vec<f64> = totals
                .iter()
                .zip(prev.iter())
                .map(|(now, before)| now.saturating_sub(*before) as f64)
                .collect();

            events.push(Event::new(
                event_key("network", &[("interface", name.as_str())]),
                format_fields(&[
                    ("net_bytes_recv", delta[0]),
                    ("net_bytes_sent", delta[1]),
                    ("net_packets_recv", delta[2]),
                    ("net_packets_sent", delta[3]),
                ]),
                epoch,
            ));
        }

        Ok(events)
    }
}
