// Bounded FIFO with an explicit overflow policy

use std::collections::VecDeque;

/// What to discard when a full queue receives another item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Keep the newest item (live input: stale key presses are worthless)
    DropOldest,
    /// Keep what is queued (file and sequencer: preserve order already planned)
    DropNewest,
}

#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Enqueue without blocking; returns the item discarded on overflow
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.items.len() < self.capacity {
            self.items.push_back(item);
            return None;
        }
        match self.policy {
            OverflowPolicy::DropOldest => {
                let discarded = self.items.pop_front();
                self.items.push_back(item);
                discarded
            }
            OverflowPolicy::DropNewest => Some(item),
        }
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Remove items from the front while `due` holds
    pub fn drain_while(&mut self, mut due: impl FnMut(&T) -> bool, out: &mut Vec<T>) {
        while self.items.front().is_some_and(|item| due(item)) {
            if let Some(item) = self.items.pop_front() {
                out.push(item);
            }
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}
