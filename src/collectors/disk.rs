/*!
 * Disk Collector
 * Per-device I/O deltas from the kernel block statistics
 */

use super::publish_or_stop;
use crate::bus::EventBus;
use crate::events::{EventRecord, EventType};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

const SECTOR_SIZE: u64 = 512;

/// Cumulative per-device counters since boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DiskCounters {
    reads_completed: u64,
    sectors_read: u64,
    writes_completed: u64,
    sectors_written: u64,
}

/// Parse one /proc/diskstats line. Returns (device, counters).
fn parse_diskstats_line(line: &str) -> Option<(String, DiskCounters)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    // major minor name reads merged sectors ms writes merged sectors ms ...
    if fields.len() < 11 {
        return None;
    }
    let name = fields[2];
    if name.starts_with("loop") || name.starts_with("ram") {
        return None;
    }
    Some((
        name.to_string(),
        DiskCounters {
            reads_completed: fields[3].parse().ok()?,
            sectors_read: fields[5].parse().ok()?,
            writes_completed: fields[7].parse().ok()?,
            sectors_written: fields[9].parse().ok()?,
        },
    ))
}

#[cfg(target_os = "linux")]
fn read_counters() -> std::io::Result<HashMap<String, DiskCounters>> {
    let raw = std::fs::read_to_string("/proc/diskstats")?;
    Ok(raw.lines().filter_map(parse_diskstats_line).collect())
}

#[cfg(not(target_os = "linux"))]
fn read_counters() -> std::io::Result<HashMap<String, DiskCounters>> {
    Ok(HashMap::new())
}

pub struct DiskCollector {
    bus: EventBus,
    interval: Duration,
    previous: HashMap<String, DiskCounters>,
}

impl DiskCollector {
    pub fn new(bus: EventBus, interval_secs: f64) -> Self {
        Self {
            bus,
            interval: Duration::from_secs_f64(interval_secs),
            previous: HashMap::new(),
        }
    }

    fn sample(&mut self) -> Vec<EventRecord> {
        let current = match read_counters() {
            Ok(counters) => counters,
            Err(e) => {
                log::warn!("failed to read disk statistics: {}", e);
                return Vec::new();
            }
        };

        let mut records = Vec::new();
        for (device, now) in &current {
            let Some(prev) = self.previous.get(device) else {
                continue; // first sight establishes the baseline
            };
            records.push(
                EventRecord::new(EventType::DiskMetric, "collector::disk")
                    .with_field("device", device.as_str())
                    .with_field(
                        "read_bytes_delta",
                        now.sectors_read.saturating_sub(prev.sectors_read) * SECTOR_SIZE,
                    )
                    .with_field(
                        "write_bytes_delta",
                        now.sectors_written.saturating_sub(prev.sectors_written) * SECTOR_SIZE,
                    )
                    .with_field(
                        "read_ops_delta",
                        now.reads_completed.saturating_sub(prev.reads_completed),
                    )
                    .with_field(
                        "write_ops_delta",
                        now.writes_completed.saturating_sub(prev.writes_completed),
                    ),
            );
        }
        self.previous = current;
        records
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!("disk collector started (interval={:?})", self.interval);
        // Baseline read so the first published tick already carries deltas
        if let Ok(counters) = read_counters() {
            self.previous = counters;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
            for record in self.sample() {
                if !publish_or_stop(&self.bus, record, "disk collector") {
                    return;
                }
            }
        }
        log::info!("disk collector stopped");
    }
}
