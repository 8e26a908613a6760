use crate::queue::EventQueue;
use crate::types::{format_fields, Event};
use std::sync::Arc;

fn make_event(i: i64) -> Event {
    Event::new(format!("os/cpu/core={i}"), format!("cpu_utilization:{i}"), 5_000)
}

#[test]
fn drain_takes_everything_in_order() {
    let queue = EventQueue::new(16);
    queue.push(make_event(1));
    queue.push_batch(vec![make_event(2), make_event(3)]);

    let drained = queue.drain();
    assert_eq!(drained.len(), 3);
    assert_eq!(drained[0].key, "os/cpu/core=1");
    assert_eq!(drained[2].key, "os/cpu/core=3");
    assert!(queue.is_empty());
}

#[test]
fn full_queue_evicts_oldest_and_counts() {
    let queue = EventQueue::new(2);
    for i in 0..5 {
        queue.push(make_event(i));
    }

    assert_eq!(queue.len(), 2);
    assert_eq!(queue.dropped(), 3);
    let drained = queue.drain();
    assert_eq!(drained[0].key, "os/cpu/core=3");
    assert_eq!(drained[1].key, "os/cpu/core=4");
}

#[test]
fn concurrent_producers_lose_nothing_below_capacity() {
    let queue = Arc::new(EventQueue::new(10_000));
    let mut handles = Vec::new();
    for t in 0..4 {
        let q = queue.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..500 {
                q.push(make_event(t * 1_000 + i));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(queue.drain().len(), 2_000);
    assert_eq!(queue.dropped(), 0);
}

#[test]
fn routing_key_is_first_segment() {
    assert_eq!(make_event(0).routing_key(), "os");
    assert_eq!(Event::new("/threads/42", "", 0).routing_key(), "threads");
    assert_eq!(Event::new("", "", 0).routing_key(), "");
}

#[test]
fn fields_parse_name_value_lines() {
    let event = Event::new("os/memory", format_fields(&[("used", 7.0), ("free", 1.5)]), 0);
    let fields: Vec<_> = event.fields().collect();
    assert_eq!(fields, vec![("used", "7"), ("free", "1.5")]);

    let noisy = Event::new("os/memory", "garbage\nused: 3\n", 0);
    assert_eq!(noisy.fields().collect::<Vec<_>>(), vec![("used", "3")]);
}

#[test]
fn event_serializes_as_plain_object() {
    let json = serde_json::to_string(&Event::new("a/b", "n:1", 1_000)).unwrap();
    assert_eq!(json, r#"{"key":"a/b","value":"n:1","epoch":1000}"#);
}
