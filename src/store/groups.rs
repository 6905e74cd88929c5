// src/store/groups.rs

//! Group name → member map.
//!
//! Same locking shape as the channel store: a coarse map mutex for
//! create/remove, and a mutex per group for membership changes. A group
//! removed from the map is marked retired so a racing `add` retries against
//! a fresh group instead of writing into a detached one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::queue::lock_ignore_poison;

#[derive(Default)]
struct Members {
    joined_at: HashMap<String, Instant>,
    retired: bool,
}

type GroupPtr = Arc<Mutex<Members>>;

#[derive(Default)]
pub(crate) struct GroupStore {
    groups: Mutex<HashMap<String, GroupPtr>>,
}

impl GroupStore {
    fn get_or_create(&self, group: &str) -> GroupPtr {
        lock_ignore_poison(&self.groups)
            .entry(group.to_string())
            .or_default()
            .clone()
    }

    /// Add `channel` to `group`, or refresh its join time.
    pub fn add(&self, group: &str, channel: &str, now: Instant) {
        // ---
        loop {
            let members = self.get_or_create(group);
            let mut members = lock_ignore_poison(&members);
            if members.retired {
                continue;
            }
            members.joined_at.insert(channel.to_string(), now);
            return;
        }
    }

    /// Remove `channel` from `group`, dropping the group once empty.
    pub fn discard(&self, group: &str, channel: &str) {
        // ---
        let members = match lock_ignore_poison(&self.groups).get(group) {
            Some(members) => members.clone(),
            None => return,
        };
        let now_empty = {
            let mut members = lock_ignore_poison(&members);
            members.joined_at.remove(channel);
            members.joined_at.is_empty()
        };
        if now_empty {
            self.remove_if_empty(group);
        }
    }

    /// Remove `group` if it has no members. Not an error if it is already
    /// gone or was repopulated by a racing caller.
    pub fn remove_if_empty(&self, group: &str) -> bool {
        // ---
        let mut groups = lock_ignore_poison(&self.groups);
        let empty = match groups.get(group) {
            Some(members) => {
                let mut members = lock_ignore_poison(members);
                if members.joined_at.is_empty() {
                    members.retired = true;
                }
                members.retired
            }
            None => return false,
        };
        if empty {
            groups.remove(group);
        }
        empty
    }

    /// Channels currently in `group`, sorted by name.
    pub fn members(&self, group: &str) -> Vec<String> {
        let members = match lock_ignore_poison(&self.groups).get(group) {
            Some(members) => members.clone(),
            None => return Vec::new(),
        };
        let mut names: Vec<String> = lock_ignore_poison(&members)
            .joined_at
            .keys()
            .cloned()
            .collect();
        names.sort_unstable();
        names
    }

    fn snapshot(&self) -> Vec<(String, GroupPtr)> {
        lock_ignore_poison(&self.groups)
            .iter()
            .map(|(name, members)| (name.clone(), members.clone()))
            .collect()
    }

    /// Remove `channel` from every group it belongs to.
    pub fn remove_channel_from_all(&self, channel: &str) -> usize {
        self.retain_members(|name, _| name != channel)
    }

    /// Drop memberships that joined before `cutoff`.
    pub fn expire_members(&self, cutoff: Instant) -> usize {
        self.retain_members(|_, joined_at| joined_at >= cutoff)
    }

    // Applies `keep` to every membership, then drops groups left empty.
    fn retain_members<F>(&self, keep: F) -> usize
    where
        F: Fn(&str, Instant) -> bool,
    {
        let mut removed = 0;
        let mut emptied = Vec::new();

        for (group, members) in self.snapshot() {
            let mut members = lock_ignore_poison(&members);
            let before = members.joined_at.len();
            members
                .joined_at
                .retain(|name, joined_at| keep(name.as_str(), *joined_at));
            let after = members.joined_at.len();
            removed += before - after;
            if before != after && after == 0 {
                emptied.push(group);
            }
        }

        for group in emptied {
            self.remove_if_empty(&group);
        }
        removed
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.groups).len()
    }

    pub fn clear(&self) {
        let drained: Vec<_> = lock_ignore_poison(&self.groups).drain().collect();
        for (_, members) in drained {
            lock_ignore_poison(&members).retired = true;
        }
    }
}
