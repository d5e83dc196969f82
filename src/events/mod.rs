/*!
 * Event System
 * The universal event record flowing through the fabric
 *
 * Every observation, kernel-space or user-space, becomes one of these.
 * Records are immutable once published; subscribers receive their own clone.
 */

use crate::core::types::{now_secs, Pid, TimestampSecs};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Event type, determines routing and metric extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Kernel events
    Syscall,
    Exec,
    Exit,
    FileOpen,
    FileRead,
    FileWrite,
    IoRead,
    IoWrite,
    NetworkSend,
    NetworkRecv,

    // User-space metrics
    CpuMetric,
    MemoryMetric,
    DiskMetric,
    NetworkMetric,
    ProcessMetric,

    // ML events
    Anomaly,
    Trend,
    Alert,
}

/// Payload value: a tagged variant covering every primitive the wire
/// format carries. Serializes to natural JSON via untagged representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// Numeric view: ints widen to floats, everything else is None
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// True for the scalar variants (everything except Map and Array)
    #[inline]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Map(_) | Value::Array(_))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Unified event record. All observability data flows through this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Opaque unique id, stable for the record's lifetime
    pub event_id: String,
    pub event_type: EventType,
    /// Wall-clock seconds since epoch, sub-second precision
    pub timestamp: TimestampSecs,
    /// Producer identifier, e.g. `ebpf::syscall_tracer`, `collector::cpu`
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<Pid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comm: Option<String>,
    pub payload: HashMap<String, Value>,
}

impl EventRecord {
    /// Create a record with a fresh id and the current wall-clock timestamp
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            event_id: short_id(),
            event_type,
            timestamp: now_secs(),
            source: source.into(),
            pid: None,
            comm: None,
            payload: HashMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: TimestampSecs) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_comm(mut self, comm: impl Into<String>) -> Self {
        self.comm = Some(comm.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Numeric payload field, ints widened to f64
    #[inline]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    /// String payload field
    #[inline]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    /// A record is publishable when its identity fields are present.
    pub fn is_well_formed(&self) -> bool {
        !self.event_id.is_empty() && !self.source.is_empty() && self.timestamp.is_finite()
    }
}

/// 8-character event id, prefix of a v4 UUID
fn short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
