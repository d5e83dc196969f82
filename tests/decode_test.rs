/*!
 * Kernel Record Decode Tests
 * The probe contract: 64-byte layout in, faithful events out
 */

use hostscope::{EventRecord, EventType, SyscallRecord};

/// Hand-build the wire bytes for the documented layout.
fn wire_record(pid: u32, tid: u32, nr: u32, latency_ns: u64, comm: &[u8]) -> Vec<u8> {
    let ts_enter: u64 = 77_000_000;
    let ts_exit: u64 = ts_enter + latency_ns;
    let mut buf = vec![0u8; 64];
    buf[0..4].copy_from_slice(&pid.to_le_bytes());
    buf[4..8].copy_from_slice(&tid.to_le_bytes());
    buf[8..12].copy_from_slice(&nr.to_le_bytes());
    buf[16..24].copy_from_slice(&ts_enter.to_le_bytes());
    buf[24..32].copy_from_slice(&ts_exit.to_le_bytes());
    buf[32..40].copy_from_slice(&latency_ns.to_le_bytes());
    buf[40..48].copy_from_slice(&42i64.to_le_bytes());
    buf[48..48 + comm.len()].copy_from_slice(comm);
    buf
}

/// A known record: pid 1234, write(2), 5423 ns, comm "python3".
#[test]
fn test_decode_known_record() {
    let raw = wire_record(1234, 1234, 1, 5423, b"python3");
    let record = SyscallRecord::decode(&raw).unwrap();

    assert_eq!(record.pid, 1234);
    assert_eq!(record.tid, 1234);
    assert_eq!(record.syscall_nr, 1);
    assert_eq!(record.latency_ns, 5423);
    assert_eq!(record.comm_str(), "python3");

    let event = record.to_event();
    assert_eq!(event.event_type, EventType::Syscall);
    assert_eq!(event.payload["syscall_nr"].as_i64(), Some(1));
    assert_eq!(event.payload["syscall_name"].as_str(), Some("write"));
    assert_eq!(event.payload["latency_ns"].as_i64(), Some(5423));
    let latency_us = event.number("latency_us").unwrap();
    assert!((latency_us - 5.423).abs() < 1e-12);
}

/// Kernel bytes -> decoded record -> bus event -> external JSON -> parsed
/// back. Every carried field survives; latency_us stays consistent with
/// latency_ns within float tolerance.
#[test]
fn test_wire_to_json_round_trip() {
    let raw = wire_record(999, 1001, 257, 12_345_678, b"postgres");
    let decoded = SyscallRecord::decode(&raw).unwrap();

    // Binary round trip is exact
    assert_eq!(decoded.encode().to_vec(), raw);

    let event = decoded.to_event();
    let json = serde_json::to_string(&event).unwrap();
    let parsed: EventRecord = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed, event);
    assert_eq!(parsed.payload["syscall_name"].as_str(), Some("openat"));
    assert_eq!(parsed.payload["ret"].as_i64(), Some(42));
    assert_eq!(
        parsed.payload["ts_exit_ns"].as_i64(),
        Some(77_000_000 + 12_345_678)
    );

    let latency_ns = parsed.payload["latency_ns"].as_i64().unwrap() as f64;
    let latency_us = parsed.number("latency_us").unwrap();
    assert!((latency_us - latency_ns / 1000.0).abs() <= f64::EPSILON * latency_us.abs());
}

#[test]
fn test_unknown_syscall_number_placeholder() {
    let raw = wire_record(1, 1, 4242, 10, b"weird");
    let event = SyscallRecord::decode(&raw).unwrap().to_event();
    assert_eq!(event.payload["syscall_name"].as_str(), Some("syscall_4242"));
}

#[test]
fn test_event_timestamp_is_exit_time() {
    let raw = wire_record(1, 1, 0, 1_000_000, b"x");
    let event = SyscallRecord::decode(&raw).unwrap().to_event();
    assert!((event.timestamp - 78e6 / 1e9).abs() < 1e-12);
}
