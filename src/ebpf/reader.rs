/*!
 * Ring-Buffer Reader
 * Polls the kernel ring buffer and publishes decoded syscall events
 *
 * The kernel side is abstracted behind `RingBufferSource`; the real BPF
 * loader implements it out of tree, replay sources implement it for
 * tests and captured traces.
 */

use super::record::SyscallRecord;
use crate::bus::EventBus;
use crate::core::errors::{BusError, EbpfError};
use crate::core::limits::{READER_BATCH_MAX, READER_POLL_INTERVAL};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Producer side of the kernel ring buffer.
///
/// `poll` drains up to `max_records` complete raw records without
/// blocking. Records the kernel overwrote before user-space caught up
/// are reflected in `lost_count`, a monotonic counter.
pub trait RingBufferSource: Send {
    fn poll(&mut self, max_records: usize) -> Result<Vec<Vec<u8>>, EbpfError>;
    fn lost_count(&self) -> u64;
}

/// Reader statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReaderMetrics {
    pub records_published: u64,
    pub records_filtered: u64,
    pub decode_failures: u64,
    pub kernel_lost: u64,
}

#[derive(Default)]
struct ReaderCounters {
    published: AtomicU64,
    filtered: AtomicU64,
    decode_failures: AtomicU64,
    kernel_lost: AtomicU64,
}

/// Decodes kernel records and publishes them as `SYSCALL` bus events.
pub struct SyscallReader {
    bus: EventBus,
    source: Box<dyn RingBufferSource>,
    min_latency_ns: u64,
    counters: Arc<ReaderCounters>,
}

/// Shared view over a running reader's counters
#[derive(Clone)]
pub struct ReaderMetricsHandle {
    counters: Arc<ReaderCounters>,
}

impl ReaderMetricsHandle {
    pub fn snapshot(&self) -> ReaderMetrics {
        ReaderMetrics {
            records_published: self.counters.published.load(Ordering::Relaxed),
            records_filtered: self.counters.filtered.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            kernel_lost: self.counters.kernel_lost.load(Ordering::Relaxed),
        }
    }
}

impl SyscallReader {
    pub fn new(bus: EventBus, source: Box<dyn RingBufferSource>, min_latency_ns: u64) -> Self {
        Self {
            bus,
            source,
            min_latency_ns,
            counters: Arc::new(ReaderCounters::default()),
        }
    }

    /// Counters stay readable after `run` consumes the reader.
    pub fn metrics_handle(&self) -> ReaderMetricsHandle {
        ReaderMetricsHandle {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Drain whatever the source has right now. Returns false once the
    /// bus refuses further publishes.
    fn drain(&mut self) -> bool {
        let batch = match self.source.poll(READER_BATCH_MAX) {
            Ok(batch) => batch,
            Err(e) => {
                log::warn!("ring buffer poll failed: {}", e);
                return true;
            }
        };

        for raw in batch {
            let record = match SyscallRecord::decode(&raw) {
                Ok(record) => record,
                Err(e) => {
                    // Malformed records are counted and dropped, never propagated
                    self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                    log::debug!("dropping malformed kernel record: {}", e);
                    continue;
                }
            };

            if record.latency_ns < self.min_latency_ns {
                self.counters.filtered.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            match self.bus.publish(record.to_event()) {
                Ok(()) => {
                    self.counters.published.fetch_add(1, Ordering::Relaxed);
                }
                Err(BusError::Closed) => return false,
                Err(e) => log::warn!("syscall event rejected: {}", e),
            }
        }

        self.counters
            .kernel_lost
            .store(self.source.lost_count(), Ordering::Relaxed);
        true
    }

    /// Poll loop. Runs until shutdown is signalled or the bus closes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "syscall reader started (min_latency_ns={})",
            self.min_latency_ns
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            if !self.drain() {
                log::info!("bus closed, syscall reader exiting");
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(READER_POLL_INTERVAL) => {}
            }
        }
        // Final drain so a clean shutdown does not strand decoded records
        self.drain();
        log::info!("syscall reader stopped");
    }
}

/// In-memory `RingBufferSource` fed by hand. Backs tests and offline
/// replay of captured traces.
#[derive(Default)]
pub struct ReplaySource {
    records: VecDeque<Vec<u8>>,
    lost: u64,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_record(&mut self, record: &SyscallRecord) {
        self.records.push_back(record.encode().to_vec());
    }

    pub fn push_raw(&mut self, raw: Vec<u8>) {
        self.records.push_back(raw);
    }

    /// Simulate the kernel overwriting unread records.
    pub fn mark_lost(&mut self, n: u64) {
        self.lost += n;
    }
}

impl RingBufferSource for ReplaySource {
    fn poll(&mut self, max_records: usize) -> Result<Vec<Vec<u8>>, EbpfError> {
        let take = self.records.len().min(max_records);
        Ok(self.records.drain(..take).collect())
    }

    fn lost_count(&self) -> u64 {
        self.lost
    }
}
