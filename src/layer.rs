//! Channel layer facade.
//!
//! [`ChannelLayer`] is the async surface applications use. It validates
//! names, applies the configured expiry and capacity, and hands every store
//! call to the blocking bridge so no caller ever blocks its scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::bridge::BlockingBridge;
use crate::names::{new_channel_name, validate_channel_name, validate_group_name};
use crate::{
    // ---
    ExecutionContext,
    Layer,
    LayerConfig,
    LayerError,
    LocalStore,
    Message,
    Result,
    StoreHost,
    StoreHostPtr,
};

/// Async channel layer over a shared store host.
///
/// Cheap to clone; clones share the same store, worker and closed state.
///
/// # Example
///
/// ```no_run
/// use channel_layer::{ChannelLayerBuilder, Layer, Message};
/// use std::time::Duration;
///
/// # async fn example() -> channel_layer::Result<()> {
/// let layer = ChannelLayerBuilder::new()
///     .expiry(Duration::from_secs(30))
///     .capacity(50)
///     .build()?;
///
/// let reply = layer.new_channel("specific.")?;
/// let mut message = Message::new();
/// message.insert("type".into(), "chat.message".into());
///
/// layer.send(&reply, message).await?;
/// let received = layer.receive(&reply).await?;
/// assert_eq!(received["type"], "chat.message");
///
/// layer.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChannelLayer {
    inner: Arc<Inner>,
}

struct Inner {
    config: LayerConfig,
    host: StoreHostPtr,
    // shared hosts outlive any one layer and are not closed by it
    owns_host: bool,
    bridge: BlockingBridge,
    // also read by receives running on the worker
    closed: Arc<AtomicBool>,
}

impl ChannelLayer {
    /// Build a layer from `config`, opening the store host its execution
    /// context names.
    pub fn new(config: LayerConfig) -> Result<Self> {
        // ---
        config.validate()?;
        let host = open_host(&config.execution_context)?;
        Self::with_host(config, host, true)
    }

    /// Build a layer over an existing host (internal use by
    /// `ChannelLayerBuilder`). `config` must already be validated.
    pub(crate) fn with_host(config: LayerConfig, host: StoreHostPtr, owns_host: bool) -> Result<Self> {
        // ---
        let bridge = BlockingBridge::start("channel-layer", config.bridge_queue_depth)?;

        crate::log_debug!(
            "channel layer ready: expiry={:?} group_expiry={:?} capacity={} context={:?}",
            config.expiry,
            config.group_expiry,
            config.capacity,
            config.execution_context
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                host,
                owns_host,
                bridge,
                closed: Arc::new(AtomicBool::new(false)),
            }),
        })
    }

    pub fn config(&self) -> &LayerConfig {
        &self.inner.config
    }

    /// Capacity that applies to `channel` under this layer's rules.
    pub fn capacity_for(&self, channel: &str) -> usize {
        self.inner.config.capacity_for(channel)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Channels currently subscribed to `group`.
    pub async fn group_members(&self, group: &str) -> Result<Vec<String>> {
        // ---
        validate_group_name(group)?;
        let group = group.to_string();
        self.call(move |host| host.group_members(&group)).await
    }

    /// Messages waiting in `channel`, or `None` when the channel does not
    /// exist. Expired entries not yet pruned are included.
    pub async fn channel_depth(&self, channel: &str) -> Result<Option<usize>> {
        // ---
        validate_channel_name(channel)?;
        let channel = channel.to_string();
        self.call(move |host| host.channel_depth(&channel)).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            crate::log_error!("channel layer used after close");
            return Err(LayerError::LayerClosed);
        }
        Ok(())
    }

    /// Run one host call on the bridge worker.
    async fn call<F, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreHost) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        // ---
        self.ensure_open()?;
        let host = self.inner.host.clone();
        let result = self.inner.bridge.run_blocking(move || op(host.as_ref())).await;
        if let Err(LayerError::LayerClosed) = &result {
            crate::log_error!("store host closed during call");
        }
        result
    }

    async fn receive_within(&self, channel: &str, timeout: Duration) -> Result<Message> {
        // ---
        validate_channel_name(channel)?;
        let capacity = self.capacity_for(channel);
        let channel = channel.to_string();

        if self.inner.owns_host {
            return self
                .call(move |host| host.receive(&channel, Some(timeout), capacity))
                .await;
        }
        // a shared host stays open on close, so the wait must watch our flag
        let closed = self.inner.closed.clone();
        self.call(move |host| {
            host.receive_interruptible(&channel, Some(timeout), capacity, &closed)
        })
        .await
    }
}

fn open_host(context: &ExecutionContext) -> Result<StoreHostPtr> {
    // ---
    match context {
        ExecutionContext::InProcess => {
            let host: StoreHostPtr = LocalStore::new();
            Ok(host)
        }
        #[cfg(unix)]
        ExecutionContext::Ipc { socket_path } => {
            let host: StoreHostPtr = crate::IpcStore::connect(socket_path)?;
            Ok(host)
        }
        #[cfg(not(unix))]
        ExecutionContext::Ipc { .. } => Err(LayerError::InvalidConfig(
            "ipc execution context requires unix domain sockets".into(),
        )),
    }
}

#[async_trait::async_trait]
impl Layer for ChannelLayer {
    async fn send(&self, channel: &str, message: Message) -> Result<()> {
        // ---
        validate_channel_name(channel)?;
        let ttl = self.inner.config.expiry;
        let capacity = self.capacity_for(channel);
        let channel = channel.to_string();
        self.call(move |host| host.send(&channel, message, ttl, capacity))
            .await
    }

    async fn receive(&self, channel: &str) -> Result<Message> {
        self.receive_within(channel, self.inner.config.expiry).await
    }

    async fn receive_with_timeout(&self, channel: &str, timeout: Duration) -> Result<Message> {
        self.receive_within(channel, timeout).await
    }

    fn new_channel(&self, prefix: &str) -> Result<String> {
        new_channel_name(prefix)
    }

    async fn group_add(&self, group: &str, channel: &str) -> Result<()> {
        // ---
        validate_group_name(group)?;
        validate_channel_name(channel)?;
        let (group, channel) = (group.to_string(), channel.to_string());
        self.call(move |host| host.group_add(&group, &channel)).await
    }

    async fn group_discard(&self, group: &str, channel: &str) -> Result<()> {
        // ---
        validate_group_name(group)?;
        validate_channel_name(channel)?;
        let (group, channel) = (group.to_string(), channel.to_string());
        self.call(move |host| host.group_discard(&group, &channel))
            .await
    }

    async fn group_send(&self, group: &str, message: Message) -> Result<()> {
        // ---
        validate_group_name(group)?;

        let group_expiry = self.inner.config.group_expiry;
        let report = self
            .call(move |host| host.sweep_expired(group_expiry))
            .await?;
        if !report.is_empty() {
            crate::log_debug!("expiry sweep before group send: {:?}", report);
        }

        let members = self.group_members(group).await?;
        let sends = members.iter().map(|member| {
            let message = message.clone();
            async move { (member, self.send(member, message).await) }
        });

        let failures: Vec<(String, LayerError)> = join_all(sends)
            .await
            .into_iter()
            .filter_map(|(member, outcome)| outcome.err().map(|err| (member.clone(), err)))
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        crate::log_warn!(
            "group send to {group:?} failed for {} of {} member(s)",
            failures.len(),
            members.len()
        );
        Err(LayerError::GroupSend {
            group: group.to_string(),
            failures,
        })
    }

    async fn flush(&self) -> Result<()> {
        self.call(|host| host.flush()).await
    }

    async fn close(&self) -> Result<()> {
        // ---
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // closing the host directly wakes a receive blocked on the worker;
        // on a shared host the raised flag interrupts it instead
        let closed = if self.inner.owns_host {
            self.inner.host.close()
        } else {
            Ok(())
        };
        self.inner.bridge.shutdown().await;

        crate::log_info!("channel layer closed");
        closed
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn layer(capacity: usize) -> ChannelLayer {
        ChannelLayer::new(LayerConfig {
            capacity,
            ..LayerConfig::default()
        })
        .unwrap()
    }

    fn msg(text: &str) -> Message {
        let mut message = Message::new();
        message.insert("text".into(), text.into());
        message
    }

    #[tokio::test]
    async fn test_rejects_invalid_names_before_touching_host() {
        // ---
        let layer = layer(5);

        assert!(matches!(
            layer.send("bad name", msg("x")).await,
            Err(LayerError::InvalidChannelName(_))
        ));
        assert!(matches!(
            layer.group_add("a!b", "chan").await,
            Err(LayerError::InvalidGroupName(_))
        ));
        assert_eq!(layer.channel_depth("bad").await.unwrap(), None);

        layer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_new_channel_is_unique_and_unused() {
        // ---
        let layer = layer(5);
        let a = layer.new_channel("specific.").unwrap();
        let b = layer.new_channel("specific.").unwrap();

        assert_ne!(a, b);
        assert!(a.starts_with("specific."));
        assert_eq!(layer.channel_depth(&a).await.unwrap(), None);

        layer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_layer_rejects_everything() {
        // ---
        let layer = layer(5);
        layer.close().await.unwrap();
        layer.close().await.unwrap();

        assert!(layer.is_closed());
        assert!(matches!(
            layer.send("c", msg("x")).await,
            Err(LayerError::LayerClosed)
        ));
        assert!(matches!(layer.flush().await, Err(LayerError::LayerClosed)));
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_receive() {
        // ---
        let layer = layer(5);
        let waiter = {
            let layer = layer.clone();
            tokio::spawn(async move { layer.receive("idle").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        layer.close().await.unwrap();

        let out = waiter.await.unwrap();
        assert!(matches!(out, Err(LayerError::LayerClosed)));
    }

    #[tokio::test]
    async fn test_close_interrupts_receive_on_shared_host() {
        // ---
        let store = LocalStore::new();
        let config = LayerConfig {
            expiry: Duration::from_secs(30),
            ..LayerConfig::default()
        };
        let layer = ChannelLayer::with_host(config, store.clone(), false).unwrap();
        let waiter = {
            let layer = layer.clone();
            tokio::spawn(async move { layer.receive("idle").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), layer.close())
            .await
            .expect("close waited out the receive")
            .unwrap();

        let out = waiter.await.unwrap();
        assert!(matches!(out, Err(LayerError::LayerClosed)));
        // the shared store itself is still usable
        store.send("idle", msg("x"), Duration::from_secs(1), 1).unwrap();
    }
}
