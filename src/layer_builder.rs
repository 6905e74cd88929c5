//! Channel layer builder.
//!
//! Provides a fluent builder API for configuring channel layers with
//! expiry, capacity and store-host settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::{CapacityRule, ChannelLayer, ExecutionContext, LayerConfig, Result, StoreHostPtr};

/// Builder for [`ChannelLayer`] instances.
///
/// Every setting is optional and falls back to [`LayerConfig::default`].
/// Settings are checked once, in [`build`](Self::build).
///
/// # Examples
///
/// ## In-process layer with a capacity override
/// ```no_run
/// use channel_layer::ChannelLayerBuilder;
/// use std::time::Duration;
///
/// # fn example() -> channel_layer::Result<()> {
/// let layer = ChannelLayerBuilder::new()
///     .expiry(Duration::from_secs(10))
///     .capacity(100)
///     .channel_capacity("http.response!*", 10)
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// ## Layer backed by a store host in another process
/// ```no_run
/// use channel_layer::ChannelLayerBuilder;
///
/// # fn example() -> channel_layer::Result<()> {
/// let layer = ChannelLayerBuilder::new()
///     .ipc("/tmp/channel-host.sock")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ChannelLayerBuilder {
    // ---
    config: LayerConfig,

    // Shared host (optional); overrides the execution context when set
    store: Option<StoreHostPtr>,
}

impl ChannelLayerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: LayerConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Set message time-to-live, also the default receive timeout.
    ///
    /// Default: 60s.
    pub fn expiry(mut self, expiry: Duration) -> Self {
        self.config.expiry = expiry;
        self
    }

    /// Set group membership time-to-live.
    ///
    /// Default: 86 400s.
    pub fn group_expiry(mut self, group_expiry: Duration) -> Self {
        self.config.group_expiry = group_expiry;
        self
    }

    /// Set the default per-channel capacity.
    ///
    /// Default: 100.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Add a capacity override for channels matching `pattern`.
    ///
    /// Rules are tried in the order they were added.
    pub fn channel_capacity(mut self, pattern: impl Into<String>, capacity: usize) -> Self {
        self.config
            .channel_capacity
            .push(CapacityRule::new(pattern, capacity));
        self
    }

    /// Keep channel state in a private in-process store (the default).
    pub fn in_process(mut self) -> Self {
        self.config.execution_context = ExecutionContext::InProcess;
        self
    }

    /// Use the store host listening on `socket_path`.
    pub fn ipc(mut self, socket_path: impl Into<PathBuf>) -> Self {
        self.config.execution_context = ExecutionContext::Ipc {
            socket_path: socket_path.into(),
        };
        self
    }

    /// Set the depth of the job queue in front of the blocking worker.
    ///
    /// Default: 1024.
    pub fn bridge_queue_depth(mut self, depth: usize) -> Self {
        self.config.bridge_queue_depth = depth;
        self
    }

    /// Share an existing store host instead of opening one.
    ///
    /// Layers built this way do not close the host on `close()`; its owner
    /// does.
    pub fn store(mut self, store: StoreHostPtr) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the channel layer (consumes self).
    pub fn build(self) -> Result<ChannelLayer> {
        // ---
        match self.store {
            Some(store) => {
                self.config.validate()?;
                ChannelLayer::with_host(self.config, store, false)
            }
            None => ChannelLayer::new(self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{LayerError, LocalStore};

    #[tokio::test]
    async fn test_defaults() {
        // ---
        let layer = ChannelLayerBuilder::new().build().unwrap();
        let config = layer.config();

        assert_eq!(config.expiry, Duration::from_secs(60));
        assert_eq!(config.group_expiry, Duration::from_secs(86_400));
        assert_eq!(config.capacity, 100);
        assert_eq!(config.execution_context, ExecutionContext::InProcess);
    }

    #[tokio::test]
    async fn test_capacity_rules_apply_in_order() {
        // ---
        let layer = ChannelLayerBuilder::new()
            .capacity(7)
            .channel_capacity("http.response!*", 10)
            .channel_capacity("http.*", 200)
            .build()
            .unwrap();

        assert_eq!(layer.capacity_for("http.response!abc"), 10);
        assert_eq!(layer.capacity_for("http.request"), 200);
        assert_eq!(layer.capacity_for("chat"), 7);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        // ---
        let zero_capacity = ChannelLayerBuilder::new().capacity(0).build();
        assert!(matches!(zero_capacity, Err(LayerError::InvalidConfig(_))));

        let zero_expiry = ChannelLayerBuilder::new().expiry(Duration::ZERO).build();
        assert!(matches!(zero_expiry, Err(LayerError::InvalidConfig(_))));

        let bad_rule = ChannelLayerBuilder::new()
            .store(LocalStore::new())
            .channel_capacity("", 3)
            .build();
        assert!(matches!(bad_rule, Err(LayerError::InvalidConfig(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_ipc_without_host_fails_to_build() {
        // ---
        let dir = tempfile::tempdir().unwrap();
        let out = ChannelLayerBuilder::new()
            .ipc(dir.path().join("missing.sock"))
            .build();
        assert!(matches!(out, Err(LayerError::Io(_))));
    }
}
