/*!
 * Network Collector
 * Per-interface byte, packet, and error deltas
 */

use super::publish_or_stop;
use crate::bus::EventBus;
use crate::events::{EventRecord, EventType};
use std::time::Duration;
use sysinfo::Networks;
use tokio::sync::watch;

pub struct NetworkCollector {
    bus: EventBus,
    interval: Duration,
    networks: Networks,
}

impl NetworkCollector {
    pub fn new(bus: EventBus, interval_secs: f64) -> Self {
        Self {
            bus,
            interval: Duration::from_secs_f64(interval_secs),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    fn sample(&mut self) -> Vec<EventRecord> {
        // received()/transmitted() report deltas since the last refresh
        self.networks.refresh();

        self.networks
            .iter()
            .map(|(name, data)| {
                EventRecord::new(EventType::NetworkMetric, "collector::network")
                    .with_field("interface", name.as_str())
                    .with_field("rx_bytes_delta", data.received())
                    .with_field("tx_bytes_delta", data.transmitted())
                    .with_field("rx_packets_delta", data.packets_received())
                    .with_field("tx_packets_delta", data.packets_transmitted())
                    .with_field("rx_errors_delta", data.errors_on_received())
                    .with_field("tx_errors_delta", data.errors_on_transmitted())
            })
            .collect()
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("network collector started (interval={:?})", self.interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
            for record in self.sample() {
                if !publish_or_stop(&self.bus, record, "network collector") {
                    return;
                }
            }
        }
        log::info!("network collector stopped");
    }
}
