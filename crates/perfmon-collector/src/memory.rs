use crate::{event_key, Collector};
use anyhow::Result;
use perfmon_common::types::{format_fields, Event};
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self, epoch: i64) -> Result<Vec<Event>> {
        self.system.refresh_memory();

        let payload = format_fields(&[
            ("memory_total", self.system.total_memory() as f64),
            ("memory_used", self.system.used_memory() as f64),
            ("memory_available", self.system.available_memory() as f64),
            ("swap_used", self.system.used_swap() as f64),
        ]);

        Ok(vec![Event::new(event_key("memory", &[]), payload, epoch)])
    }
}
