/*!
 * User-Space Collectors
 * Periodic pollers publishing resource metrics to the bus
 *
 * Each collector is an independent task with its own interval. Failures
 * are logged and the loop continues; the fabric is lossy-best-effort.
 */

mod cpu;
mod disk;
mod memory;
mod network;
mod process;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use memory::MemoryCollector;
pub use network::NetworkCollector;
pub use process::ProcessCollector;

use crate::core::errors::BusError;

/// Shared publish handling: true to keep running, false once the bus is
/// gone.
pub(crate) fn publish_or_stop(
    bus: &crate::bus::EventBus,
    record: crate::events::EventRecord,
    collector: &str,
) -> bool {
    match bus.publish(record) {
        Ok(()) => true,
        Err(BusError::Closed) => {
            log::info!("bus closed, {} exiting", collector);
            false
        }
        Err(e) => {
            log::warn!("{} record rejected: {}", collector, e);
            true
        }
    }
}
