//! Bounded FIFO of tag reads shared between the reader and the metric loop.
//!
//! The lock is held only to push one event or to copy a tail slice out;
//! everything downstream runs on the copy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::EngineError;
use crate::types::TagEvent;

/// Thread-safe, fixed-capacity event buffer with drop-oldest eviction.
#[derive(Debug)]
pub struct EventBuffer {
    events: Mutex<VecDeque<TagEvent>>,
    capacity: usize,
    appended: AtomicU64,
    evicted: AtomicU64,
}

impl EventBuffer {
    /// Create a buffer holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            appended: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<TagEvent>>, EngineError> {
        self.events.lock().map_err(|_| EngineError::BufferPoisoned)
    }

    /// Append one event, evicting the single oldest event when full.
    pub fn append(&self, event: TagEvent) -> Result<(), EngineError> {
        let evicted = {
            let mut events = self.lock()?;
            events.push_back(event);
            if events.len() > self.capacity {
                events.pop_front();
                true
            } else {
                false
            }
        };

        self.appended.fetch_add(1, Ordering::Relaxed);
        if evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copy of the most recent `min(n, len)` events, oldest first.
    pub fn snapshot_tail(&self, n: usize) -> Result<Vec<TagEvent>, EngineError> {
        let events = self.lock()?;
        let skip = events.len().saturating_sub(n);
        Ok(events.iter().skip(skip).cloned().collect())
    }

    /// Copy of every buffered event, oldest first.
    pub fn snapshot_all(&self) -> Result<Vec<TagEvent>, EngineError> {
        let events = self.lock()?;
        Ok(events.iter().cloned().collect())
    }

    /// Drop every buffered event. Counters are kept.
    pub fn clear(&self) -> Result<(), EngineError> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total events ever appended.
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Total events evicted by overflow.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn event(i: i64) -> TagEvent {
        TagEvent::new("A", i, 902.75, 0.0, -50.0)
    }

    #[test]
    fn test_overflow_evicts_exactly_oldest() {
        let buffer = EventBuffer::new(3);
        for i in 0..5 {
            buffer.append(event(i)).unwrap();
        }

        let all = buffer.snapshot_all().unwrap();
        let stamps: Vec<i64> = all.iter().map(|e| e.timestamp_micros).collect();
        assert_eq!(stamps, vec![2, 3, 4]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.appended(), 5);
        assert_eq!(buffer.evicted(), 2);
    }

    #[test]
    fn test_snapshot_tail_shorter_than_request() {
        let buffer = EventBuffer::new(10);
        buffer.append(event(1)).unwrap();
        buffer.append(event(2)).unwrap();

        assert_eq!(buffer.snapshot_tail(5).unwrap().len(), 2);
        let tail = buffer.snapshot_tail(1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].timestamp_micros, 2);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let buffer = EventBuffer::new(10);
        buffer.append(event(1)).unwrap();
        let snapshot = buffer.snapshot_tail(10).unwrap();
        buffer.append(event(2)).unwrap();
        buffer.clear().unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_appends_respect_capacity() {
        let buffer = Arc::new(EventBuffer::new(100));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buffer.append(event(t * 1_000 + i)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(buffer.len(), 100);
        assert_eq!(buffer.appended(), 1_000);
        assert_eq!(buffer.evicted(), 900);
    }
}
