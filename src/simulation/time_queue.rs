//! Min-heap of payloads keyed by the elapsed simulation time at which they
//! become due. Entries with equal trigger times come out in no particular
//! order.

use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

struct Entry<T> {
    trigger: Reverse<OrderedFloat<f32>>,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.trigger == other.trigger
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.trigger.cmp(&other.trigger)
    }
}

pub struct TimeQueue<T> {
    heap: BinaryHeap<Entry<T>>,
}

impl<T> Default for TimeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimeQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Schedules `payload` for `trigger` (elapsed seconds)
    pub fn add(&mut self, trigger: f32, payload: T) {
        self.heap.push(Entry {
            trigger: Reverse(OrderedFloat(trigger)),
            payload,
        });
    }

    /// Removes and returns the earliest payload if it is due at `now`
    pub fn poll(&mut self, now: f32) -> Option<T> {
        let due = self.peek_time()? <= now;
        if !due {
            return None;
        }
        self.heap.pop().map(|entry| entry.payload)
    }

    /// Trigger time of the earliest entry
    pub fn peek_time(&self) -> Option<f32> {
        self.heap.peek().map(|entry| entry.trigger.0.into_inner())
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
