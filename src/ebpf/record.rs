/*!
 * Kernel Record Layout
 * Fixed 64-byte little-endian record emitted by the syscall probe
 *
 * Field widths are part of the probe contract; changing them is a
 * breaking change on both sides.
 */

use super::syscalls::resolve_syscall_name;
use crate::core::errors::EbpfError;
use crate::events::{EventRecord, EventType};

/// Wire size of one kernel record
pub const SYSCALL_RECORD_SIZE: usize = 64;

/// Decoded syscall record.
///
/// Layout (packed, little-endian):
/// `pid:u32 tid:u32 syscall_nr:u32 pad:u32 ts_enter_ns:u64 ts_exit_ns:u64
///  latency_ns:u64 ret:i64 comm:[u8;16]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRecord {
    pub pid: u32,
    pub tid: u32,
    pub syscall_nr: u32,
    pub ts_enter_ns: u64,
    pub ts_exit_ns: u64,
    pub latency_ns: u64,
    pub ret: i64,
    pub comm: [u8; 16],
}

impl SyscallRecord {
    /// Decode one record from raw ring buffer bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, EbpfError> {
        if buf.len() < SYSCALL_RECORD_SIZE {
            return Err(EbpfError::TruncatedRecord {
                len: buf.len(),
                expected: SYSCALL_RECORD_SIZE,
            });
        }

        let u32_at = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        let u64_at = |off: usize| u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());

        let mut comm = [0u8; 16];
        comm.copy_from_slice(&buf[48..64]);

        Ok(Self {
            pid: u32_at(0),
            tid: u32_at(4),
            syscall_nr: u32_at(8),
            // offset 12 is padding
            ts_enter_ns: u64_at(16),
            ts_exit_ns: u64_at(24),
            latency_ns: u64_at(32),
            ret: i64::from_le_bytes(buf[40..48].try_into().unwrap()),
            comm,
        })
    }

    /// Encode back to the wire layout. Used by replay sources and tests.
    pub fn encode(&self) -> [u8; SYSCALL_RECORD_SIZE] {
        let mut buf = [0u8; SYSCALL_RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.pid.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tid.to_le_bytes());
        buf[8..12].copy_from_slice(&self.syscall_nr.to_le_bytes());
        buf[16..24].copy_from_slice(&self.ts_enter_ns.to_le_bytes());
        buf[24..32].copy_from_slice(&self.ts_exit_ns.to_le_bytes());
        buf[32..40].copy_from_slice(&self.latency_ns.to_le_bytes());
        buf[40..48].copy_from_slice(&self.ret.to_le_bytes());
        buf[48..64].copy_from_slice(&self.comm);
        buf
    }

    /// Command name with NUL padding stripped
    pub fn comm_str(&self) -> String {
        let end = self.comm.iter().position(|&b| b == 0).unwrap_or(16);
        String::from_utf8_lossy(&self.comm[..end]).into_owned()
    }

    /// Build the bus event for this record. Timestamp is the syscall exit
    /// time; latency is carried in both ns and derived microseconds.
    pub fn to_event(&self) -> EventRecord {
        EventRecord::new(EventType::Syscall, "ebpf::syscall_tracer")
            .with_timestamp(self.ts_exit_ns as f64 / 1e9)
            .with_pid(self.pid)
            .with_comm(self.comm_str())
            .with_field("syscall_nr", self.syscall_nr as i64)
            .with_field("syscall_name", resolve_syscall_name(self.syscall_nr))
            .with_field("latency_ns", self.latency_ns as i64)
            .with_field("latency_us", self.latency_ns as f64 / 1000.0)
            .with_field("ret", self.ret)
            .with_field("ts_enter_ns", self.ts_enter_ns as i64)
            .with_field("ts_exit_ns", self.ts_exit_ns as i64)
    }
}
