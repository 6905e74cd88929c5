//! Layer configuration.
//!
//! `LayerConfig` carries no host-specific state beyond the choice of
//! [`ExecutionContext`]; the store hosts receive TTLs and capacities per call,
//! so a cross-process host serves layers with different settings correctly.

use std::path::PathBuf;
use std::time::Duration;

use crate::{LayerError, Result};

/// Where the shared store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionContext {
    /// A private in-process store owned by the layer.
    InProcess,

    /// A [`HostServer`](crate::HostServer) reached over a Unix domain socket,
    /// possibly in another process.
    Ipc { socket_path: PathBuf },
}

/// Capacity override for channel names matching a glob pattern.
///
/// `*` matches any run of characters (including none) and `?` matches
/// exactly one. There is no escaping; names cannot contain either character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityRule {
    pub pattern: String,
    pub capacity: usize,
}

impl CapacityRule {
    pub fn new(pattern: impl Into<String>, capacity: usize) -> Self {
        Self {
            pattern: pattern.into(),
            capacity,
        }
    }

    /// Whether `name` matches this rule's pattern.
    pub fn matches(&self, name: &str) -> bool {
        glob_match(self.pattern.as_bytes(), name.as_bytes())
    }
}

// Iterative matcher with single-star backtracking; linear in practice.
fn glob_match(pattern: &[u8], name: &[u8]) -> bool {
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some(b'*') => {
                star = Some((p, n));
                p += 1;
            }
            Some(&c) if c == b'?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((sp, sn)) => {
                    p = sp + 1;
                    n = sn + 1;
                    star = Some((sp, sn + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

/// Channel layer configuration.
#[derive(Debug, Clone)]
pub struct LayerConfig {
    /// Message time-to-live. Also the default `receive` timeout.
    ///
    /// Default: 60 seconds
    pub expiry: Duration,

    /// Group membership time-to-live, measured from the last `group_add`.
    ///
    /// Default: 86 400 seconds (one day)
    pub group_expiry: Duration,

    /// Per-channel bound on non-expired messages.
    ///
    /// Default: 100
    pub capacity: usize,

    /// Ordered capacity overrides; the first matching rule wins.
    pub channel_capacity: Vec<CapacityRule>,

    /// Which store host backs the layer.
    pub execution_context: ExecutionContext,

    /// Depth of the job queue in front of the blocking worker.
    ///
    /// Default: 1024
    pub bridge_queue_depth: usize,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(60),
            group_expiry: Duration::from_secs(86_400),
            capacity: 100,
            channel_capacity: Vec::new(),
            execution_context: ExecutionContext::InProcess,
            bridge_queue_depth: 1024,
        }
    }
}

impl LayerConfig {
    /// Capacity that applies to `channel`.
    pub fn capacity_for(&self, channel: &str) -> usize {
        self.channel_capacity
            .iter()
            .find(|rule| rule.matches(channel))
            .map(|rule| rule.capacity)
            .unwrap_or(self.capacity)
    }

    /// Reject settings the layer cannot operate with.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.expiry.is_zero() {
            return Err(LayerError::InvalidConfig("expiry must be non-zero".into()));
        }
        if self.group_expiry.is_zero() {
            return Err(LayerError::InvalidConfig(
                "group_expiry must be non-zero".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(LayerError::InvalidConfig("capacity must be at least 1".into()));
        }
        if self.bridge_queue_depth == 0 {
            return Err(LayerError::InvalidConfig(
                "bridge_queue_depth must be at least 1".into(),
            ));
        }
        for rule in &self.channel_capacity {
            if rule.pattern.is_empty() {
                return Err(LayerError::InvalidConfig(
                    "capacity pattern must not be empty".into(),
                ));
            }
            if rule.capacity == 0 {
                return Err(LayerError::InvalidConfig(format!(
                    "capacity for pattern {:?} must be at least 1",
                    rule.pattern
                )));
            }
        }
        Ok(())
    }
}
