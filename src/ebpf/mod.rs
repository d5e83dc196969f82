/*!
 * Kernel Ingestion
 * Ring-buffer reader side of the syscall probe contract
 *
 * The probe program itself lives out of tree; this module owns the record
 * layout, the syscall name table, and the poll loop that turns raw ring
 * buffer bytes into bus events.
 */

mod reader;
mod record;
mod syscalls;

pub use reader::{ReaderMetrics, ReplaySource, RingBufferSource, SyscallReader};
pub use record::{SyscallRecord, SYSCALL_RECORD_SIZE};
pub use syscalls::{resolve_syscall_name, syscall_name};

use crate::core::config::EbpfConfig;
use crate::core::errors::EbpfError;
use crate::core::limits::KERNEL_RING_PAGES;

/// Attach the kernel syscall probe and expose its ring buffer.
///
/// The probe object ships separately from this crate; a build without it
/// reports `AttachFailed`, which is fatal when syscall tracing is
/// enabled and ignored otherwise. The probe reserves its ring at load
/// time, so the effective size is capped at the probe-side reservation.
pub fn attach_probe(config: &EbpfConfig) -> Result<Box<dyn RingBufferSource>, EbpfError> {
    let pages = config.buffer_pages.min(KERNEL_RING_PAGES);
    Err(EbpfError::AttachFailed(format!(
        "syscall probe object not bundled in this build ({pages} ring pages requested)"
    )))
}
