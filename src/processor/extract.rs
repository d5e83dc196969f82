/*!
 * Metric Extraction
 * Schema-per-event-type mapping from payloads to named scalar samples
 *
 * Each event type has a fixed schema; payload access goes through these
 * helpers rather than free-form indexing. Unknown event types extract
 * nothing.
 */

use crate::events::{EventRecord, EventType, Value};

/// Extract `(metric_key, value)` pairs from a record.
pub fn extract_metrics(record: &EventRecord) -> Vec<(String, f64)> {
    match record.event_type {
        EventType::CpuMetric => extract_cpu(record),
        EventType::MemoryMetric => extract_memory(record),
        EventType::DiskMetric => extract_disk(record),
        EventType::NetworkMetric => extract_network(record),
        EventType::ProcessMetric => extract_process(record),
        EventType::Syscall => extract_syscall(record),
        EventType::IoRead => extract_io(record, "io.read_latency_us"),
        EventType::IoWrite => extract_io(record, "io.write_latency_us"),
        _ => Vec::new(),
    }
}

fn extract_cpu(record: &EventRecord) -> Vec<(String, f64)> {
    let mut out = Vec::new();
    if let Some(total) = record.number("percent_total") {
        out.push(("cpu.total".to_string(), total));
    }
    if let Some(Value::Array(cores)) = record.payload.get("percent_per_core") {
        for (core, value) in cores.iter().enumerate() {
            if let Some(percent) = value.as_f64() {
                out.push((format!("cpu.{core}"), percent));
            }
        }
    }
    if let Some(freq) = record.number("freq_mhz") {
        out.push(("cpu.freq_mhz".to_string(), freq));
    }
    out
}

fn extract_memory(record: &EventRecord) -> Vec<(String, f64)> {
    [
        ("virtual_used", "memory.virtual"),
        ("virtual_percent", "memory.virtual_percent"),
        ("swap_used", "memory.swap"),
        ("swap_percent", "memory.swap_percent"),
    ]
    .iter()
    .filter_map(|(field, key)| record.number(field).map(|v| (key.to_string(), v)))
    .collect()
}

fn extract_disk(record: &EventRecord) -> Vec<(String, f64)> {
    let Some(device) = record.text("device") else {
        return Vec::new();
    };
    [
        "read_bytes_delta",
        "write_bytes_delta",
        "read_ops_delta",
        "write_ops_delta",
    ]
    .iter()
    .filter_map(|field| {
        record
            .number(field)
            .map(|v| (format!("disk.{device}.{field}"), v))
    })
    .collect()
}

fn extract_network(record: &EventRecord) -> Vec<(String, f64)> {
    let Some(iface) = record.text("interface") else {
        return Vec::new();
    };
    [
        "rx_bytes_delta",
        "tx_bytes_delta",
        "rx_errors_delta",
        "tx_errors_delta",
        "rx_dropped_delta",
        "tx_dropped_delta",
    ]
    .iter()
    .filter_map(|field| {
        record
            .number(field)
            .map(|v| (format!("net.{iface}.{field}"), v))
    })
    .collect()
}

fn extract_process(record: &EventRecord) -> Vec<(String, f64)> {
    let Some(pid) = record
        .pid
        .map(|p| p as i64)
        .or_else(|| record.payload.get("pid").and_then(Value::as_i64))
    else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if let Some(cpu) = record.number("cpu_percent") {
        out.push((format!("proc.{pid}.cpu_percent"), cpu));
    }
    if let Some(rss) = record.number("rss") {
        out.push((format!("proc.{pid}.rss"), rss));
    }
    out
}

fn extract_syscall(record: &EventRecord) -> Vec<(String, f64)> {
    match (record.text("syscall_name"), record.number("latency_us")) {
        (Some(name), Some(latency)) => vec![(format!("syscall.{name}.latency_us"), latency)],
        _ => Vec::new(),
    }
}

fn extract_io(record: &EventRecord, key: &str) -> Vec<(String, f64)> {
    record
        .number("latency_us")
        .map(|v| vec![(key.to_string(), v)])
        .unwrap_or_default()
}
