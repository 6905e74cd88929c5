// src/domain/layer.rs

//! Channel layer abstraction.
//!
//! This is the surface an application framework holds on to. It makes no
//! reference to where channel state lives; that is a construction-time
//! choice of the concrete layer.

use std::sync::Arc;
use std::time::Duration;

use crate::{Message, Result};

/// Asynchronous channel layer.
///
/// All methods except [`new_channel`](Layer::new_channel) suspend the caller
/// until the store has serviced the request. Successive awaited calls from
/// one task complete in the order they were made.
///
/// # Notes
///
/// This trait uses `async_trait`; rendered docs show boxed futures. Treat the
/// methods as plain `async fn`s.
#[async_trait::async_trait]
pub trait Layer: Send + Sync {
    /// Capabilities beyond point-to-point messaging.
    fn extensions(&self) -> &'static [&'static str] {
        &["groups", "flush"]
    }

    /// Deliver `message` to `channel`.
    async fn send(&self, channel: &str, message: Message) -> Result<()>;

    /// Take the next message from `channel`, waiting up to the layer's expiry.
    async fn receive(&self, channel: &str) -> Result<Message>;

    /// Take the next message from `channel`, waiting up to `timeout`.
    async fn receive_with_timeout(&self, channel: &str, timeout: Duration) -> Result<Message>;

    /// Generate a unique channel name under `prefix`. Never suspends.
    fn new_channel(&self, prefix: &str) -> Result<String>;

    /// Subscribe `channel` to `group`.
    async fn group_add(&self, group: &str, channel: &str) -> Result<()>;

    /// Unsubscribe `channel` from `group`.
    async fn group_discard(&self, group: &str, channel: &str) -> Result<()>;

    /// Deliver a copy of `message` to every channel in `group`.
    async fn group_send(&self, group: &str, message: Message) -> Result<()>;

    /// Drop all channels and groups.
    async fn flush(&self) -> Result<()>;

    /// Tear the layer down. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Shared layer pointer, as held by application code.
pub type LayerPtr = Arc<dyn Layer>;
