//! Bounded reply queues and the collectors that fill them.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::event::Listener;
use crate::protocol::AntMessage;
use crate::protocol::variant::ChannelEvent;

/// Number of entries each reply queue keeps.
pub const QUEUE_CAPACITY: usize = 25;

/// A fixed-capacity queue that drops its oldest entry on overflow.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue. A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an item, evicting the oldest one if the queue is full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Removes and returns the most recent item matching `predicate`.
    pub fn take_newest(&mut self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let index = self.items.iter().rposition(|item| predicate(item))?;
        self.items.remove(index)
    }

    /// Removes every item matching `predicate` and returns how many went.
    pub fn purge(&mut self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !predicate(item));
        before - self.items.len()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(QUEUE_CAPACITY)
    }
}

/// A listener that stores matching messages in a bounded queue.
#[derive(Debug)]
pub struct Collector<T> {
    queue: Mutex<BoundedQueue<T>>,
}

impl<T> Default for Collector<T> {
    fn default() -> Self {
        Self {
            queue: Mutex::new(BoundedQueue::default()),
        }
    }
}

impl<T> Collector<T> {
    fn lock(&self) -> MutexGuard<'_, BoundedQueue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores an item.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Removes and returns the most recent item matching `predicate`.
    pub fn take(&self, predicate: impl FnMut(&T) -> bool) -> Option<T> {
        self.lock().take_newest(predicate)
    }

    /// Drops every item matching `predicate`.
    pub fn purge(&self, predicate: impl FnMut(&T) -> bool) -> usize {
        self.lock().purge(predicate)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Captures channel events: command replies and RF events.
pub type AckCollector = Collector<ChannelEvent>;

/// Captures every message.
pub type MessageCollector = Collector<AntMessage>;

impl Listener for AckCollector {
    fn process(&self, message: &AntMessage) -> Result<()> {
        if let Some(event) = message.as_channel_event() {
            self.push(*event);
        }
        Ok(())
    }
}

impl Listener for MessageCollector {
    fn process(&self, message: &AntMessage) -> Result<()> {
        self.push(*message);
        Ok(())
    }
}
