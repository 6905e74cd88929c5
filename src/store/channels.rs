// src/store/channels.rs

//! Channel name → queue map.
//!
//! The map mutex is the coarse creation lock: it is held for a lookup plus
//! an insert or remove, never while waiting on a queue. Lock order is always
//! map before queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::queue::{lock_ignore_poison, ExpiringQueue};

#[derive(Default)]
struct Channels {
    queues: HashMap<String, Arc<ExpiringQueue>>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct ChannelStore {
    channels: Mutex<Channels>,
}

impl ChannelStore {
    /// Existing queue for `name`, or a fresh one bounded by `capacity`.
    ///
    /// Capacity only matters on creation; an existing channel keeps the
    /// bound it was created with. After `close()` the returned queue is
    /// already closed and never stored.
    pub fn get_or_create(&self, name: &str, capacity: usize) -> Arc<ExpiringQueue> {
        // ---
        let mut channels = lock_ignore_poison(&self.channels);
        if channels.closed {
            let queue = ExpiringQueue::new(capacity);
            queue.close();
            return Arc::new(queue);
        }
        channels
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ExpiringQueue::new(capacity)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ExpiringQueue>> {
        lock_ignore_poison(&self.channels).queues.get(name).cloned()
    }

    /// Remove `name` if its queue is empty and has no blocked consumer.
    ///
    /// A racing caller may already have removed or recreated the channel;
    /// either way this is not an error. Returns whether a queue was removed.
    pub fn remove_if_idle(&self, name: &str) -> bool {
        // ---
        let mut channels = lock_ignore_poison(&self.channels);
        let idle = match channels.queues.get(name) {
            Some(queue) => queue.retire_if_idle(),
            None => return false,
        };
        if idle {
            channels.queues.remove(name);
        }
        idle
    }

    /// All (name, queue) pairs at this instant.
    pub fn snapshot(&self) -> Vec<(String, Arc<ExpiringQueue>)> {
        lock_ignore_poison(&self.channels)
            .queues
            .iter()
            .map(|(name, queue)| (name.clone(), queue.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.channels).queues.len()
    }

    /// Drop every channel. Blocked consumers re-resolve onto fresh queues.
    pub fn clear(&self) {
        let drained: Vec<_> = lock_ignore_poison(&self.channels).queues.drain().collect();
        for (_, queue) in drained {
            queue.retire();
        }
    }

    /// Drop every channel and fail all blocked consumers with `Closed`.
    pub fn close(&self) {
        let drained: Vec<_> = {
            let mut channels = lock_ignore_poison(&self.channels);
            channels.closed = true;
            channels.queues.drain().collect()
        };
        for (_, queue) in drained {
            queue.close();
        }
    }
}
