use crate::types::Event;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Log one overflow warning per this many dropped events.
const DROP_LOG_EVERY: u64 = 1000;

/// Thread-safe queue between the collectors and the event log.
///
/// Collectors push from any thread; the queue processor takes everything at
/// once with [`EventQueue::drain`]. When the queue is full the oldest event is
/// evicted and counted, so a push never blocks a sampling thread.
pub struct EventQueue {
    buffer: Mutex<VecDeque<Event>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Lock the buffer, recovering from a poisoned Mutex if necessary.
    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<Event>> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, event: Event) {
        let mut buf = self.lock_buffer();
        self.push_locked(&mut buf, event);
    }

    pub fn push_batch(&self, events: Vec<Event>) {
        let mut buf = self.lock_buffer();
        for event in events {
            self.push_locked(&mut buf, event);
        }
    }

    fn push_locked(&self, buf: &mut VecDeque<Event>, event: Event) {
        if buf.len() >= self.capacity {
            buf.pop_front();
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % DROP_LOG_EVERY == 1 {
                tracing::warn!(
                    dropped,
                    capacity = self.capacity,
                    "Event queue full, dropping oldest events"
                );
            }
        }
        buf.push_back(event);
    }

    /// Takes every event currently queued in a single critical section.
    pub fn drain(&self) -> Vec<Event> {
        let mut buf = self.lock_buffer();
        buf.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock_buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_buffer().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of events evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
