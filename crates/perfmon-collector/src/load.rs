use crate::{event_key, Collector};
use anyhow::Result;
use perfmon_common::types::{format_fields, Event};
use sysinfo::System;

#[derive(Default)]
pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self, epoch: i64) -> Result<Vec<Event>> {
        let load_avg = System::load_average();
        Ok(vec![Event::new(
            event_key("load", &[]),
            format_fields(&[
                ("load_1", load_avg.one),
                ("load_5", load_avg.five),
                ("load_15", load_avg.fifteen),
            ]),
            epoch,
        )])
    }
}
