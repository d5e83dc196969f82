/*!
 * hostscope
 * Host-level observability: kernel syscall tracing fused with user-space
 * resource sampling, streamed through an in-process event fabric and
 * scored by an anomaly-detection ensemble.
 */

pub mod bus;
pub mod collectors;
pub mod core;
pub mod ebpf;
pub mod events;
pub mod ml;
pub mod processor;
pub mod query;

pub use bus::{BusMetrics, EventBus, Subscription};
pub use self::core::{Config, MonitorError, MonitorResult};
pub use ebpf::{ReplaySource, RingBufferSource, SyscallReader, SyscallRecord};
pub use events::{EventRecord, EventType, Value};
pub use ml::{DetectionPipeline, TrendPipeline};
pub use processor::{ProcessResolver, StreamProcessor};
pub use query::QueryService;
