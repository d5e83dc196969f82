/*!
 * Memory Collector
 * Virtual memory and swap totals
 */

use super::publish_or_stop;
use crate::bus::EventBus;
use crate::events::{EventRecord, EventType};
use std::time::Duration;
use sysinfo::System;
use tokio::sync::watch;

pub struct MemoryCollector {
    bus: EventBus,
    interval: Duration,
    sys: System,
}

impl MemoryCollector {
    pub fn new(bus: EventBus, interval_secs: f64) -> Self {
        Self {
            bus,
            interval: Duration::from_secs_f64(interval_secs),
            sys: System::new(),
        }
    }

    fn sample(&mut self) -> EventRecord {
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        let swap_total = self.sys.total_swap();
        let swap_used = self.sys.used_swap();

        let percent = |used: u64, total: u64| {
            if total == 0 {
                0.0
            } else {
                used as f64 / total as f64 * 100.0
            }
        };

        EventRecord::new(EventType::MemoryMetric, "collector::memory")
            .with_field("virtual_total", total)
            .with_field("virtual_used", used)
            .with_field("virtual_available", self.sys.available_memory())
            .with_field("virtual_percent", percent(used, total))
            .with_field("swap_total", swap_total)
            .with_field("swap_used", swap_used)
            .with_field("swap_percent", percent(swap_used, swap_total))
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("memory collector started (interval={:?})", self.interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
            let record = self.sample();
            if !publish_or_stop(&self.bus, record, "memory collector") {
                return;
            }
        }
        log::info!("memory collector stopped");
    }
}
