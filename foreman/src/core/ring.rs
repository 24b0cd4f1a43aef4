//! Fixed-capacity ring buffer for bounded signal history.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Bounded FIFO that evicts the oldest entry once capacity is reached.
///
/// The capacity is part of the serialized form, so persisted documents carry
/// their bound across restarts instead of relying on post-hoc truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ring<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> Ring<T> {
    /// Create an empty ring. A zero capacity is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: VecDeque::new(),
        }
    }

    /// Append an entry, evicting the oldest if the ring is full.
    ///
    /// Also re-establishes the bound after deserializing a document that was
    /// edited by hand to hold more entries than its capacity.
    pub fn push(&mut self, item: T) {
        while self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest_beyond_capacity() {
        let mut ring = Ring::new(3);
        for n in 1..=5 {
            ring.push(n);
        }
        assert_eq!(ring.len(), 3);
        let items: Vec<i32> = ring.iter().copied().collect();
        assert_eq!(items, vec![3, 4, 5]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = Ring::new(0);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.last(), Some(&"b"));
    }

    #[test]
    fn round_trips_with_capacity() {
        let mut ring = Ring::new(2);
        ring.push(7u32);
        let json = serde_json::to_string(&ring).expect("serialize");
        let loaded: Ring<u32> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(loaded, ring);
        assert_eq!(loaded.capacity(), 2);
    }

    #[test]
    fn push_restores_bound_after_oversized_deserialize() {
        let json = "{\"capacity\":2,\"items\":[1,2,3,4]}";
        let mut ring: Ring<u32> = serde_json::from_str(json).expect("deserialize");
        ring.push(5);
        assert_eq!(ring.len(), 2);
        let items: Vec<u32> = ring.iter().copied().collect();
        assert_eq!(items, vec![4, 5]);
    }
}
