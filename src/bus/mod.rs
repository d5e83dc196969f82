/*!
 * Event Bus
 * In-process pub/sub fabric with bounded per-subscriber queues
 *
 * Design: producers never block. A slow subscriber self-paces by losing
 * its oldest queued records (drop-oldest), not by pushing backpressure
 * upstream. Each subscriber observes an independent view.
 */

use crate::core::errors::BusError;
use crate::events::{EventRecord, EventType};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Bus statistics snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusMetrics {
    pub total_published: u64,
    pub total_dropped: u64,
    pub subscriber_count: usize,
    pub per_subscriber_queue_depth: HashMap<String, usize>,
    pub per_subscriber_dropped: HashMap<String, u64>,
}

struct SubscriberEntry {
    id: String,
    /// Accepted event types; empty set accepts everything
    filter: HashSet<EventType>,
    capacity: usize,
    queue: Mutex<VecDeque<EventRecord>>,
    notify: Notify,
    dropped: AtomicU64,
    removed: AtomicBool,
}

impl SubscriberEntry {
    #[inline]
    fn accepts(&self, event_type: EventType) -> bool {
        self.filter.is_empty() || self.filter.contains(&event_type)
    }
}

struct BusInner {
    buffer_size: usize,
    subscribers: RwLock<HashMap<String, Arc<SubscriberEntry>>>,
    total_published: AtomicU64,
    total_dropped: AtomicU64,
    closed: AtomicBool,
}

/// The event fabric. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose subscribers each get a queue of `buffer_size`.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                buffer_size,
                subscribers: RwLock::new(HashMap::new()),
                total_published: AtomicU64::new(0),
                total_dropped: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Register a subscriber. An empty filter accepts every event type.
    ///
    /// Fails if the id is taken, the bus is shut down, or the queue
    /// capacity is zero.
    pub fn subscribe(
        &self,
        subscriber_id: &str,
        filter: &[EventType],
    ) -> Result<Subscription, BusError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if self.inner.buffer_size == 0 {
            return Err(BusError::InvalidCapacity(0));
        }

        let entry = Arc::new(SubscriberEntry {
            id: subscriber_id.to_string(),
            filter: filter.iter().copied().collect(),
            capacity: self.inner.buffer_size,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            removed: AtomicBool::new(false),
        });

        let mut subscribers = self.inner.subscribers.write();
        if subscribers.contains_key(subscriber_id) {
            return Err(BusError::SubscriberConflict(subscriber_id.to_string()));
        }
        subscribers.insert(subscriber_id.to_string(), Arc::clone(&entry));
        drop(subscribers);

        log::info!("subscriber registered: {}", subscriber_id);
        Ok(Subscription {
            entry,
            bus: self.clone(),
        })
    }

    /// Remove a subscriber and discard its queue. Safe to call while
    /// records are in flight; those records are dropped with the queue.
    pub fn unsubscribe(&self, subscriber_id: &str) {
        let removed = self.inner.subscribers.write().remove(subscriber_id);
        if let Some(entry) = removed {
            entry.removed.store(true, Ordering::Release);
            entry.queue.lock().clear();
            entry.notify.notify_waiters();
            log::info!("subscriber unregistered: {}", subscriber_id);
        }
    }

    /// Route a record to every subscriber whose filter accepts it.
    ///
    /// Never blocks. A full queue evicts its oldest record to admit the
    /// new one and the subscriber's drop counter is incremented.
    pub fn publish(&self, record: EventRecord) -> Result<(), BusError> {
        if !record.is_well_formed() {
            return Err(BusError::MalformedRecord(format!(
                "event_id='{}' source='{}'",
                record.event_id, record.source
            )));
        }
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }

        self.inner.total_published.fetch_add(1, Ordering::Relaxed);

        let subscribers = self.inner.subscribers.read();
        for entry in subscribers.values() {
            if !entry.accepts(record.event_type) {
                continue;
            }
            {
                let mut queue = entry.queue.lock();
                if queue.len() >= entry.capacity {
                    queue.pop_front();
                    entry.dropped.fetch_add(1, Ordering::Relaxed);
                    self.inner.total_dropped.fetch_add(1, Ordering::Relaxed);
                }
                queue.push_back(record.clone());
            }
            entry.notify.notify_one();
        }
        Ok(())
    }

    /// Bus statistics snapshot
    pub fn metrics(&self) -> BusMetrics {
        let subscribers = self.inner.subscribers.read();
        let mut per_subscriber_queue_depth = HashMap::with_capacity(subscribers.len());
        let mut per_subscriber_dropped = HashMap::with_capacity(subscribers.len());
        for (id, entry) in subscribers.iter() {
            per_subscriber_queue_depth.insert(id.clone(), entry.queue.lock().len());
            per_subscriber_dropped.insert(id.clone(), entry.dropped.load(Ordering::Relaxed));
        }
        BusMetrics {
            total_published: self.inner.total_published.load(Ordering::Relaxed),
            total_dropped: self.inner.total_dropped.load(Ordering::Relaxed),
            subscriber_count: subscribers.len(),
            per_subscriber_queue_depth,
            per_subscriber_dropped,
        }
    }

    /// Shut the bus down. Pending `receive` calls observe the sentinel;
    /// further publishes and subscriptions fail with `Closed`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let subscribers = self.inner.subscribers.read();
        for entry in subscribers.values() {
            entry.notify.notify_waiters();
        }
        log::info!("event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Consumer-side handle returned by `subscribe`.
///
/// Dropping the handle unsubscribes, unless the id was already taken over
/// by a newer registration.
pub struct Subscription {
    entry: Arc<SubscriberEntry>,
    bus: EventBus,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.entry.id)
            .finish()
    }
}

impl Subscription {
    /// Await the next record in arrival order (FIFO modulo eviction).
    ///
    /// Returns `None` once the bus is shut down or this subscriber was
    /// removed and its queue is exhausted.
    pub async fn recv(&self) -> Option<EventRecord> {
        loop {
            // Arm the waker before checking, so a publish between the
            // check and the await cannot be missed.
            let notified = self.entry.notify.notified();
            if let Some(record) = self.entry.queue.lock().pop_front() {
                return Some(record);
            }
            if self.bus.inner.closed.load(Ordering::Acquire)
                || self.entry.removed.load(Ordering::Acquire)
            {
                return None;
            }
            notified.await;
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&self) -> Option<EventRecord> {
        self.entry.queue.lock().pop_front()
    }

    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn queue_depth(&self) -> usize {
        self.entry.queue.lock().len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.entry.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.entry.removed.load(Ordering::Acquire) {
            return;
        }
        let mut subscribers = self.bus.inner.subscribers.write();
        // Only remove the table entry if it is still ours
        if let Some(current) = subscribers.get(&self.entry.id) {
            if Arc::ptr_eq(current, &self.entry) {
                subscribers.remove(&self.entry.id);
                self.entry.removed.store(true, Ordering::Release);
            }
        }
    }
}
