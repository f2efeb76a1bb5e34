use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{ClientError, Result};
use crate::message::Message;
use crate::sync::lock;

/// Default inbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Thread-safe FIFO hand-off between the receive thread and the pump.
///
/// One mutex covers every enqueue and drain, so a drain never observes a
/// half-finished enqueue.
#[derive(Debug)]
pub struct MessageQueue {
    inner: Mutex<QueueInner>,
}

#[derive(Debug)]
struct QueueInner {
    items: VecDeque<Message>,
    capacity: Option<usize>,
    dropped: u64,
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::bounded(DEFAULT_QUEUE_CAPACITY)
    }
}

impl MessageQueue {
    /// Queue that rejects messages once `capacity` are waiting.
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    /// Queue without a length limit.
    pub fn unbounded() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                capacity,
                dropped: 0,
            }),
        }
    }

    /// Append a message at the tail.
    ///
    /// When the queue is full the message is dropped, the drop counter is
    /// incremented and `QueueFull` is returned.
    pub fn enqueue(&self, message: Message) -> Result<()> {
        let mut inner = lock(&self.inner);
        if let Some(capacity) = inner.capacity {
            if inner.items.len() >= capacity {
                inner.dropped = inner.dropped.saturating_add(1);
                return Err(ClientError::QueueFull { capacity });
            }
        }
        inner.items.push_back(message);
        Ok(())
    }

    /// Remove up to `max` messages from the head, oldest first.
    ///
    /// Never blocks; returns fewer messages (possibly none) when the queue
    /// is shorter than `max`.
    pub fn drain_up_to(&self, max: usize) -> Vec<Message> {
        let mut inner = lock(&self.inner);
        let count = max.min(inner.items.len());
        inner.items.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).items.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).items.is_empty()
    }

    /// Discard every queued message.
    pub fn clear(&self) {
        lock(&self.inner).items.clear();
    }

    /// Number of messages rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        lock(&self.inner).dropped
    }

    pub fn capacity(&self) -> Option<usize> {
        lock(&self.inner).capacity
    }
}
