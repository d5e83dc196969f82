/*!
 * Event Bus Tests
 * Delivery, backpressure, and accounting under realistic load
 */

use hostscope::{EventBus, EventRecord, EventType};

fn cpu_record(seq: i64) -> EventRecord {
    EventRecord::new(EventType::CpuMetric, "collector::cpu").with_field("seq", seq)
}

/// Normal load: a subscriber with headroom sees every record, in order,
/// with nothing dropped.
#[tokio::test]
async fn test_full_delivery_under_normal_load() {
    let bus = EventBus::new(10_000);
    let sub = bus.subscribe("query_layer", &[EventType::CpuMetric]).unwrap();

    for i in 0..10_000 {
        bus.publish(cpu_record(i)).unwrap();
    }

    let metrics = bus.metrics();
    assert_eq!(metrics.total_published, 10_000);
    assert_eq!(metrics.total_dropped, 0);

    for expected in 0..10_000 {
        let record = sub.recv().await.expect("record");
        assert_eq!(record.payload["seq"].as_i64(), Some(expected));
    }
    assert_eq!(sub.queue_depth(), 0);
}

/// Slow consumer: production outruns consumption; the consumer later
/// observes exactly the most recent capacity-many records.
#[test]
fn test_drop_oldest_slow_consumer() {
    let bus = EventBus::new(100);
    let sub = bus.subscribe("sleepy", &[]).unwrap();

    for i in 0..1000 {
        bus.publish(cpu_record(i)).unwrap();
    }

    assert_eq!(sub.dropped_count(), 900);
    let drained: Vec<i64> = std::iter::from_fn(|| sub.try_recv())
        .map(|r| r.payload["seq"].as_i64().unwrap())
        .collect();
    let expected: Vec<i64> = (900..1000).collect();
    assert_eq!(drained, expected);
}

/// Delivered records are a subsequence of the filtered publishes, and the
/// queue-depth/dropped accounting balances at every instant.
#[test]
fn test_delivery_accounting_invariant() {
    let bus = EventBus::new(50);
    let sub = bus.subscribe("acct", &[EventType::CpuMetric]).unwrap();

    let mut matching = 0u64;
    for i in 0..500 {
        if i % 3 == 0 {
            bus.publish(EventRecord::new(EventType::MemoryMetric, "m")).unwrap();
        } else {
            bus.publish(cpu_record(i)).unwrap();
            matching += 1;
        }

        // The balance holds mid-stream, not just at the end
        if i % 97 == 0 {
            let queued = sub.queue_depth() as u64;
            assert_eq!(matching - queued, sub.dropped_count());
        }
    }

    let queued = sub.queue_depth() as u64;
    assert!(queued <= 50);
    assert_eq!(matching - queued, sub.dropped_count());

    // Survivors retain publish order
    let seqs: Vec<i64> = std::iter::from_fn(|| sub.try_recv())
        .map(|r| r.payload["seq"].as_i64().unwrap())
        .collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
}

/// total_dropped is non-decreasing and always the sum of the
/// per-subscriber counters.
#[test]
fn test_total_dropped_matches_sum() {
    let bus = EventBus::new(10);
    let _a = bus.subscribe("a", &[]).unwrap();
    let _b = bus.subscribe("b", &[EventType::CpuMetric]).unwrap();
    let _c = bus.subscribe("c", &[EventType::MemoryMetric]).unwrap();

    let mut last_total = 0;
    for i in 0..200 {
        bus.publish(cpu_record(i)).unwrap();
        let m = bus.metrics();
        assert!(m.total_dropped >= last_total, "total_dropped regressed");
        assert_eq!(
            m.total_dropped,
            m.per_subscriber_dropped.values().sum::<u64>()
        );
        last_total = m.total_dropped;
    }
    // Only the unfiltered and cpu-filtered subscribers overflowed
    let m = bus.metrics();
    assert_eq!(m.per_subscriber_dropped["a"], 190);
    assert_eq!(m.per_subscriber_dropped["b"], 190);
    assert_eq!(m.per_subscriber_dropped["c"], 0);
}

/// Each subscriber sees an independent view: eviction at a stalled
/// subscriber does not disturb one that keeps up.
#[test]
fn test_independent_fanout_views() {
    let bus = EventBus::new(5);
    let keeping_up = bus.subscribe("keeping_up", &[]).unwrap();
    let stalled = bus.subscribe("stalled", &[]).unwrap();

    let mut seen = Vec::new();
    for i in 0..20 {
        bus.publish(cpu_record(i)).unwrap();
        // One consumer drains every publish, the other never does
        if let Some(record) = keeping_up.try_recv() {
            seen.push(record.payload["seq"].as_i64().unwrap());
        }
    }

    let expected: Vec<i64> = (0..20).collect();
    assert_eq!(seen, expected, "draining subscriber misses nothing");
    assert_eq!(keeping_up.dropped_count(), 0);
    assert_eq!(stalled.dropped_count(), 15);
    assert_eq!(stalled.queue_depth(), 5);
}
