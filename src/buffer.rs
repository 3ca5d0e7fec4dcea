//! Rolling signal buffers
//!
//! Fixed-capacity FIFO windows of samples. The owning lab pushes from its
//! per-frame callback; analyzers only ever see an owned [`RollingBuffer::snapshot`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Tremor position window
pub const TREMOR_CAPACITY: usize = 300;
/// Tap interval window
pub const TAP_INTERVAL_CAPACITY: usize = 600;
/// Accepted pitch history window
pub const PITCH_HISTORY_CAPACITY: usize = 100;

/// Capacity-bounded buffer that evicts its oldest elements on overflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingBuffer<T> {
    values: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RollingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting from the front until `capacity` remain
    pub fn push(&mut self, value: T) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Ordered copy of the current contents
    pub fn snapshot(&self) -> Vec<T> {
        self.values.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.values.back()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
