// src/store/local.rs

//! In-process store host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::channels::ChannelStore;
use super::groups::GroupStore;
use super::queue::{Entry, ExpiringQueue, QueueError};

#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_info,
    LayerError,
    Message,
    Result,
    StoreHost,
    SweepReport,
};

/// In-process store host.
///
/// Owns one channel store and one group store. Any number of threads may
/// call into it concurrently; a [`HostServer`](crate::HostServer) shares one
/// with every connected process.
///
/// ## Semantics
///
/// - Channels and groups are created on first use and removed once empty.
/// - A channel that is reaped, whether drained by consumers, timed out on or
///   emptied by expiry, also leaves every group it was in. A channel that
///   was never created keeps its memberships until they expire.
/// - `close()` wakes blocked receivers with `LayerClosed` and rejects all
///   further calls.
#[derive(Default)]
pub struct LocalStore {
    // ---
    channels: ChannelStore,
    groups: GroupStore,
    closed: AtomicBool,
}

impl LocalStore {
    /// Create a new, empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(LayerError::LayerClosed)
        } else {
            Ok(())
        }
    }

    /// Number of channels currently in the store.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of groups currently in the store.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // Removes an empty, unwatched channel from the store and every group.
    fn reap(&self, name: &str) -> bool {
        let reaped = self.channels.remove_if_idle(name);
        if reaped {
            self.groups.remove_channel_from_all(name);
        }
        reaped
    }

    // Shared by both receive flavours; an interrupted wait counts as a timeout
    // for collection purposes.
    fn receive_until(
        &self,
        channel: &str,
        timeout: Option<Duration>,
        capacity: usize,
        interrupted: Option<&AtomicBool>,
    ) -> Result<Message> {
        // ---
        self.ensure_open()?;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let queue = self.channels.get_or_create(channel, capacity);
            self.prune_channel(channel, &queue, Instant::now());

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match queue.pop(remaining, interrupted) {
                Ok((entry, now_empty)) => {
                    if now_empty {
                        self.reap(channel);
                    }
                    if entry.is_expired(Instant::now()) {
                        continue;
                    }
                    return Ok(entry.payload);
                }
                Err(QueueError::Timeout) => {
                    self.reap(channel);
                    return Err(LayerError::Timeout);
                }
                Err(QueueError::Interrupted) => {
                    self.reap(channel);
                    return Err(LayerError::LayerClosed);
                }
                Err(QueueError::Closed) => return Err(LayerError::LayerClosed),
                Err(QueueError::Retired) => continue,
                Err(QueueError::Full | QueueError::Empty) => {
                    unreachable!("pop never reports Full or Empty")
                }
            }
        }
    }

    // Drops expired head entries of one channel, reaping it if that empties it.
    fn prune_channel(&self, name: &str, queue: &ExpiringQueue, now: Instant) -> (usize, bool) {
        // ---
        let expired = queue.drain_expired(now);
        if expired == 0 || !queue.is_empty() {
            return (expired, false);
        }
        let reaped = self.reap(name);
        if reaped {
            log_debug!("reaped expired channel {name}");
        }
        (expired, reaped)
    }
}

impl StoreHost for LocalStore {
    // ---
    fn send(&self, channel: &str, message: Message, ttl: Duration, capacity: usize) -> Result<()> {
        // ---
        self.ensure_open()?;
        let mut entry = Entry::new(message, ttl);

        loop {
            let queue = self.channels.get_or_create(channel, capacity);
            queue.drain_expired(Instant::now());

            match queue.put(entry, false) {
                Ok(()) => return Ok(()),
                Err(rejected) => match rejected.reason {
                    QueueError::Full => return Err(LayerError::ChannelFull(channel.to_string())),
                    QueueError::Closed => return Err(LayerError::LayerClosed),
                    // removed between lookup and put; resolve the name again
                    _ => entry = rejected.entry,
                },
            }
        }
    }

    fn receive(&self, channel: &str, timeout: Option<Duration>, capacity: usize) -> Result<Message> {
        self.receive_until(channel, timeout, capacity, None)
    }

    fn receive_interruptible(
        &self,
        channel: &str,
        timeout: Option<Duration>,
        capacity: usize,
        interrupted: &AtomicBool,
    ) -> Result<Message> {
        self.receive_until(channel, timeout, capacity, Some(interrupted))
    }

    fn group_add(&self, group: &str, channel: &str) -> Result<()> {
        self.ensure_open()?;
        self.groups.add(group, channel, Instant::now());
        Ok(())
    }

    fn group_discard(&self, group: &str, channel: &str) -> Result<()> {
        self.ensure_open()?;
        self.groups.discard(group, channel);
        Ok(())
    }

    fn group_members(&self, group: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        Ok(self.groups.members(group))
    }

    fn sweep_expired(&self, group_expiry: Duration) -> Result<SweepReport> {
        // ---
        self.ensure_open()?;
        let now = Instant::now();
        let mut report = SweepReport::default();

        for (name, queue) in self.channels.snapshot() {
            let (expired, reaped) = self.prune_channel(&name, &queue, now);
            report.expired_messages += expired;
            report.reaped_channels += usize::from(reaped);
        }

        if let Some(cutoff) = now.checked_sub(group_expiry) {
            report.expired_members = self.groups.expire_members(cutoff);
        }

        if !report.is_empty() {
            log_debug!("expiry sweep: {report:?}");
        }
        Ok(report)
    }

    fn channel_depth(&self, channel: &str) -> Result<Option<usize>> {
        self.ensure_open()?;
        Ok(self.channels.get(channel).map(|queue| queue.len()))
    }

    fn flush(&self) -> Result<()> {
        // ---
        self.ensure_open()?;
        self.channels.clear();
        self.groups.clear();
        log_debug!("store flushed");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // ---
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.channels.close();
        self.groups.clear();
        log_info!("store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::thread;

    const TTL: Duration = Duration::from_secs(60);

    fn msg(n: i64) -> Message {
        let mut m = Message::new();
        m.insert("n".into(), n.into());
        m
    }

    #[test]
    fn test_send_receive_fifo() {
        // ---
        let store = LocalStore::new();
        store.send("c", msg(1), TTL, 10).unwrap();
        store.send("c", msg(2), TTL, 10).unwrap();

        assert_eq!(store.receive("c", Some(Duration::ZERO), 10).unwrap(), msg(1));
        assert_eq!(store.receive("c", Some(Duration::ZERO), 10).unwrap(), msg(2));
        assert_eq!(store.channel_count(), 0);
    }

    #[test]
    fn test_capacity_counts_only_live_entries() {
        // ---
        let store = LocalStore::new();
        store.send("c", msg(1), Duration::ZERO, 1).unwrap();
        thread::sleep(Duration::from_millis(5));

        // the expired head is pruned before the capacity check
        store.send("c", msg(2), TTL, 1).unwrap();
        assert!(matches!(
            store.send("c", msg(3), TTL, 1),
            Err(LayerError::ChannelFull(name)) if name == "c"
        ));
        assert_eq!(store.channel_depth("c").unwrap(), Some(1));
    }

    #[test]
    fn test_receive_timeout_removes_channel() {
        // ---
        let store = LocalStore::new();
        assert!(matches!(
            store.receive("idle", Some(Duration::from_millis(20)), 10),
            Err(LayerError::Timeout)
        ));
        assert_eq!(store.channel_depth("idle").unwrap(), None);
    }

    #[test]
    fn test_expired_messages_are_not_delivered() {
        // ---
        let store = LocalStore::new();
        store.send("c", msg(1), Duration::from_millis(10), 10).unwrap();
        thread::sleep(Duration::from_millis(30));

        assert!(matches!(
            store.receive("c", Some(Duration::from_millis(10)), 10),
            Err(LayerError::Timeout)
        ));
    }

    #[test]
    fn test_sweep_reaps_expired_channel_from_groups() {
        // ---
        let store = LocalStore::new();
        store.group_add("g", "dead").unwrap();
        store.group_add("g", "alive").unwrap();
        store.send("dead", msg(1), Duration::from_millis(5), 10).unwrap();
        store.send("alive", msg(2), TTL, 10).unwrap();
        thread::sleep(Duration::from_millis(20));

        let report = store.sweep_expired(Duration::from_secs(3600)).unwrap();

        assert_eq!(report.expired_messages, 1);
        assert_eq!(report.reaped_channels, 1);
        assert_eq!(report.expired_members, 0);
        assert_eq!(store.group_members("g").unwrap(), vec!["alive"]);
        assert_eq!(store.channel_depth("dead").unwrap(), None);
    }

    #[test]
    fn test_drained_channel_leaves_its_groups() {
        // ---
        let store = LocalStore::new();
        store.group_add("g", "c").unwrap();
        store.group_add("g", "other").unwrap();
        store.send("c", msg(1), TTL, 10).unwrap();
        store.send("c", msg(2), TTL, 10).unwrap();

        store.receive("c", Some(Duration::ZERO), 10).unwrap();
        assert_eq!(store.channel_depth("c").unwrap(), Some(1));
        assert_eq!(store.group_members("g").unwrap().len(), 2);

        store.receive("c", Some(Duration::ZERO), 10).unwrap();
        assert_eq!(store.channel_depth("c").unwrap(), None);
        assert_eq!(store.group_members("g").unwrap(), vec!["other"]);
    }

    #[test]
    fn test_membership_without_traffic_survives_sweep() {
        // ---
        let store = LocalStore::new();
        store.group_add("g", "quiet").unwrap();

        let report = store.sweep_expired(Duration::from_secs(3600)).unwrap();
        assert!(report.is_empty());
        assert_eq!(store.group_members("g").unwrap(), vec!["quiet"]);
    }

    #[test]
    fn test_sweep_expires_stale_members() {
        // ---
        let store = LocalStore::new();
        store.group_add("g", "c").unwrap();
        thread::sleep(Duration::from_millis(20));

        let report = store.sweep_expired(Duration::from_millis(5)).unwrap();
        assert_eq!(report.expired_members, 1);
        assert!(store.group_members("g").unwrap().is_empty());
        assert_eq!(store.group_count(), 0);
    }

    #[test]
    fn test_concurrent_receivers_split_entries() {
        // ---
        let store = LocalStore::new();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || store.receive("work", Some(Duration::from_secs(5)), 10))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        for n in 0..4 {
            store.send("work", msg(n), TTL, 10).unwrap();
        }

        let mut seen: Vec<i64> = consumers
            .into_iter()
            .map(|h| h.join().unwrap().unwrap()["n"].as_i64().unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_blocked_receive_on_one_channel_does_not_block_others() {
        // ---
        let store = LocalStore::new();
        let waiter = {
            let store = store.clone();
            thread::spawn(move || store.receive("slow", Some(Duration::from_secs(5)), 10))
        };

        thread::sleep(Duration::from_millis(20));
        store.send("fast", msg(7), TTL, 10).unwrap();
        assert_eq!(store.receive("fast", Some(Duration::ZERO), 10).unwrap(), msg(7));

        store.send("slow", msg(8), TTL, 10).unwrap();
        assert_eq!(waiter.join().unwrap().unwrap(), msg(8));
    }

    #[test]
    fn test_flush_drops_everything() {
        // ---
        let store = LocalStore::new();
        store.send("c", msg(1), TTL, 10).unwrap();
        store.group_add("g", "c").unwrap();

        store.flush().unwrap();

        assert_eq!(store.channel_count(), 0);
        assert_eq!(store.group_count(), 0);
    }

    #[test]
    fn test_close_wakes_receivers_and_rejects_calls() {
        // ---
        let store = LocalStore::new();
        let waiter = {
            let store = store.clone();
            thread::spawn(move || store.receive("c", None, 10))
        };

        thread::sleep(Duration::from_millis(20));
        store.close().unwrap();
        store.close().unwrap();

        assert!(matches!(waiter.join().unwrap(), Err(LayerError::LayerClosed)));
        assert!(matches!(
            store.send("c", msg(1), TTL, 10),
            Err(LayerError::LayerClosed)
        ));
    }
}
