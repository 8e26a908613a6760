use crate::{event_key, Collector};
use anyhow::Result;
use perfmon_common::types::{format_fields, Event};
use sysinfo::System;

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self, epoch: i64) -> Result<Vec<Event>> {
        self.system.refresh_cpu_all();
        let mut events = Vec::with_capacity(self.system.cpus().len() + 1);

        let global_usage = self.system.global_cpu_usage() as f64;
        events.push(Event::new(
            event_key("cpu", &[]),
            format_fields(&[("cpu_utilization", global_usage)]),
            epoch,
        ));

        for (i, cpu) in self.system.cpus().iter().enumerate() {
            let core = i.to_string();
            events.push(Event::new(
                event_key("cpu", &[("core", core.as_str())]),
                format_fields(&[("core_utilization", cpu.cpu_usage() as f64)]),
                epoch,
            ));
        }

        Ok(events)
    }
}
