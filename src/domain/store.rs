// src/domain/store.rs

//! Shared store host abstraction.
//!
//! A store host is the single authoritative owner of channel and group state.
//! Every operation is blocking and individually serialized by the host, which
//! is what lets the same contract be served in-process (`LocalStore`) or by a
//! separate process over local IPC (`IpcStore` talking to a `HostServer`).
//!
//! Hosts hold no layer policy. Time-to-live and capacity travel with each
//! call, so one host can serve several layers configured differently.
//!
//! Async callers never use a host directly; they go through the layer's
//! blocking bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{LayerError, Result};

/// Longest single wait of the default [`StoreHost::receive_interruptible`].
const RECEIVE_SLICE: Duration = Duration::from_millis(50);

/// Opaque message payload.
///
/// The layer moves and clones messages but never inspects them.
pub type Message = serde_json::Map<String, serde_json::Value>;

/// Outcome counters of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Messages dropped because their time-to-live elapsed.
    pub expired_messages: usize,
    /// Channels drained to empty by expiry and removed from the store and
    /// their groups.
    pub reaped_channels: usize,
    /// Group memberships dropped because `group_expiry` elapsed.
    pub expired_members: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

/// Blocking shared store host.
///
/// Implementations must make operations on one channel (or group)
/// linearizable, and must never let a blocked `receive` on one channel hold
/// up operations on another.
pub trait StoreHost: Send + Sync {
    /// Enqueue `message` on `channel`, creating the channel with `capacity`
    /// if absent. The message expires `ttl` from now.
    ///
    /// Fails with `ChannelFull` when the channel already holds its capacity
    /// of non-expired messages.
    fn send(&self, channel: &str, message: Message, ttl: Duration, capacity: usize) -> Result<()>;

    /// Pop the oldest live message on `channel`, waiting up to `timeout`
    /// (`None` waits until a message arrives or the host closes).
    ///
    /// Expired head entries are pruned first. A channel left empty, by the
    /// pop or by a timeout, is removed from the store and from its groups.
    fn receive(&self, channel: &str, timeout: Option<Duration>, capacity: usize) -> Result<Message>;

    /// [`receive`](Self::receive) that gives up with `LayerClosed` soon after
    /// `interrupted` is raised.
    ///
    /// Lets a layer that shares a host with others abandon its own pending
    /// receive without closing the host. The default waits in short slices
    /// of `receive`; a slice that times out on an empty channel collects it
    /// like any other timeout. Hosts that can keep the caller registered as
    /// a waiter should override this.
    fn receive_interruptible(
        &self,
        channel: &str,
        timeout: Option<Duration>,
        capacity: usize,
        interrupted: &AtomicBool,
    ) -> Result<Message> {
        // ---
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if interrupted.load(Ordering::Acquire) {
                return Err(LayerError::LayerClosed);
            }
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            let slice = remaining.map_or(RECEIVE_SLICE, |r| r.min(RECEIVE_SLICE));
            match self.receive(channel, Some(slice), capacity) {
                Err(LayerError::Timeout) if remaining.map_or(true, |r| slice < r) => continue,
                other => return other,
            }
        }
    }

    /// Add or refresh `channel`'s membership in `group`.
    fn group_add(&self, group: &str, channel: &str) -> Result<()>;

    /// Remove `channel` from `group`; the group disappears with its last member.
    fn group_discard(&self, group: &str, channel: &str) -> Result<()>;

    /// Snapshot of the channels currently in `group`.
    fn group_members(&self, group: &str) -> Result<Vec<String>>;

    /// Prune every channel's expired entries and drop group memberships
    /// older than `group_expiry`.
    fn sweep_expired(&self, group_expiry: Duration) -> Result<SweepReport>;

    /// Number of entries queued on `channel`, or `None` when the channel is
    /// absent from the store.
    fn channel_depth(&self, channel: &str) -> Result<Option<usize>>;

    /// Drop every channel and group.
    fn flush(&self) -> Result<()>;

    /// Release the host. Blocked receivers wake with `LayerClosed`.
    fn close(&self) -> Result<()>;
}

/// Shared store host pointer.
///
/// Cloning is cheap; clones address the same underlying store, so several
/// layers in one process can share state by sharing a pointer.
pub type StoreHostPtr = Arc<dyn StoreHost>;
