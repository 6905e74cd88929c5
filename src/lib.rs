//! Multi-process channel layer with fan-out groups, TTL expiry and
//! per-channel backpressure.
//!
//! Named channels are FIFO queues where each message is delivered to exactly
//! one receiver. Groups fan a message out to every subscribed channel.
//! Messages expire after a configurable time-to-live and channels are
//! created on first use and removed once empty.
//!
//! The async facade ([`ChannelLayer`]) runs every store call on a dedicated
//! worker thread, so callers never block their scheduler. The store itself
//! lives either in-process ([`LocalStore`]) or in a host process reached
//! over a Unix domain socket ([`HostServer`] / [`IpcStore`]).
//!

mod macros;
#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Import all sub modules once...
mod bridge;
mod config;
mod domain;
mod error;
mod layer;
mod layer_builder;
mod names;
mod store;

#[cfg(unix)]
mod ipc;

// Re-export main types
pub use layer::ChannelLayer;
pub use layer_builder::ChannelLayerBuilder;

pub use config::{CapacityRule, ExecutionContext, LayerConfig};
pub use error::{LayerError, Result};
pub use names::{
    //
    new_channel_name,
    validate_channel_name,
    validate_group_name,
    DEFAULT_CHANNEL_PREFIX,
    MAX_NAME_LENGTH,
};

pub use store::LocalStore;

#[cfg(unix)]
pub use ipc::{HostServer, IpcStore};

// --- public re-exports
pub use domain::{
    //
    Layer,
    LayerPtr,
    Message,
    StoreHost,
    StoreHostPtr,
    SweepReport,
};
