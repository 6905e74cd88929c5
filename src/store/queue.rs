// src/store/queue.rs

//! Bounded, blocking FIFO of expiring entries.
//!
//! Entries are enqueued with `expires_at = now + ttl` for a single,
//! layer-wide ttl, so expiry times never decrease from head to tail and
//! pruning only ever needs to look at the head.
//!
//! Besides its entries a queue tracks two lifecycle flags:
//!
//! - `retired`: the queue was removed from its channel store. Callers that
//!   still hold it get [`QueueError::Retired`] and re-resolve the name, so
//!   nothing is ever put on, or waited for on, an orphaned queue.
//! - `closed`: the host shut down. Every operation fails with
//!   [`QueueError::Closed`] and blocked waiters wake immediately.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::Message;

/// Longest stretch an interruptible wait sleeps before re-checking its flag.
pub(crate) const INTERRUPT_POLL: Duration = Duration::from_millis(20);

/// One queued message.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub expires_at: Instant,
    pub payload: Message,
}

impl Entry {
    pub fn new(payload: Message, ttl: Duration) -> Self {
        Self {
            expires_at: Instant::now() + ttl,
            payload,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at < now
    }
}

/// A `put` that did not enqueue; hands the entry back to the caller.
#[derive(Debug)]
pub(crate) struct Rejected {
    pub reason: QueueError,
    pub entry: Entry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueError {
    Full,
    Empty,
    Timeout,
    Retired,
    Closed,
    Interrupted,
}

struct State {
    entries: VecDeque<Entry>,
    waiters: usize,
    retired: bool,
    closed: bool,
}

impl State {
    fn check_usable(&self) -> Result<(), QueueError> {
        if self.closed {
            Err(QueueError::Closed)
        } else if self.retired {
            Err(QueueError::Retired)
        } else {
            Ok(())
        }
    }
}

pub(crate) struct ExpiringQueue {
    capacity: usize,
    state: Mutex<State>,
    not_empty: Condvar,
    not_full: Condvar,
}

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ExpiringQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                entries: VecDeque::new(),
                waiters: 0,
                retired: false,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_ignore_poison(&self.state)
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Append `entry`.
    ///
    /// With `block == false` a full queue fails with `Full`; otherwise the
    /// caller waits until a consumer makes room.
    pub fn put(&self, entry: Entry, block: bool) -> Result<(), Rejected> {
        // ---
        let mut state = self.lock();
        loop {
            if let Err(reason) = state.check_usable() {
                return Err(Rejected { reason, entry });
            }
            if state.entries.len() < self.capacity {
                break;
            }
            if !block {
                return Err(Rejected {
                    reason: QueueError::Full,
                    entry,
                });
            }
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        state.entries.push_back(entry);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove and return the oldest entry, waiting up to `timeout` for one.
    ///
    /// The flag is true when the queue is empty after the pop, which the
    /// store uses to decide whether to garbage-collect the channel.
    ///
    /// With `interrupted` set, the wait is re-checked every
    /// [`INTERRUPT_POLL`] and ends with `Interrupted` once the flag is
    /// raised. The caller stays counted as a waiter throughout.
    pub fn pop(
        &self,
        timeout: Option<Duration>,
        interrupted: Option<&AtomicBool>,
    ) -> Result<(Entry, bool), QueueError> {
        // ---
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();

        loop {
            state.check_usable()?;
            if interrupted.is_some_and(|flag| flag.load(Ordering::Acquire)) {
                return Err(QueueError::Interrupted);
            }
            if let Some(entry) = state.entries.pop_front() {
                let now_empty = state.entries.is_empty();
                self.not_full.notify_one();
                return Ok((entry, now_empty));
            }

            let mut wait = match deadline {
                None => None,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(QueueError::Timeout);
                    }
                    Some(remaining)
                }
            };
            if interrupted.is_some() {
                wait = Some(wait.map_or(INTERRUPT_POLL, |w| w.min(INTERRUPT_POLL)));
            }

            state.waiters += 1;
            state = match wait {
                None => self
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(wait) => {
                    self.not_empty
                        .wait_timeout(state, wait)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
            state.waiters -= 1;
        }
    }

    /// Copy of the oldest entry, left in place.
    #[cfg(test)]
    pub fn peek_oldest(&self) -> Result<Entry, QueueError> {
        self.lock().entries.front().cloned().ok_or(QueueError::Empty)
    }

    /// Drop the head entry if it expired before `now`.
    ///
    /// Returns true when an entry was removed; callers loop until false.
    pub fn prune_expired(&self, now: Instant) -> bool {
        // ---
        let mut state = self.lock();
        let expired = state.entries.front().is_some_and(|e| e.is_expired(now));
        if expired {
            state.entries.pop_front();
            self.not_full.notify_one();
        }
        expired
    }

    /// Prune until the head is live or the queue is empty.
    pub fn drain_expired(&self, now: Instant) -> usize {
        let mut dropped = 0;
        while self.prune_expired(now) {
            dropped += 1;
        }
        dropped
    }

    /// Mark the queue removed from its store, but only if it is empty and
    /// nobody is blocked on it. Returns whether the queue was retired.
    pub fn retire_if_idle(&self) -> bool {
        // ---
        let mut state = self.lock();
        if state.retired {
            return true;
        }
        if !state.entries.is_empty() || state.waiters > 0 {
            return false;
        }
        state.retired = true;
        self.not_full.notify_all();
        true
    }

    /// Mark the queue removed regardless of contents; waiters re-resolve.
    pub fn retire(&self) {
        let mut state = self.lock();
        state.retired = true;
        state.entries.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Fail every current and future operation with `Closed`.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.entries.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}
