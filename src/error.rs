use thiserror::Error;

/// Errors surfaced by the channel layer and its store hosts.
#[derive(Error, Debug)]
pub enum LayerError {
    /// Channel name is empty, too long, or uses characters outside the
    /// allowed set (or more than one `!` separator).
    #[error("invalid channel name: {0:?}")]
    InvalidChannelName(String),

    /// Group name is empty, too long, or uses characters outside the
    /// allowed set.
    #[error("invalid group name: {0:?}")]
    InvalidGroupName(String),

    /// The channel already holds `capacity` non-expired messages.
    #[error("channel full: {0}")]
    ChannelFull(String),

    /// No message arrived within the requested wait window.
    #[error("receive timed out")]
    Timeout,

    /// Operation attempted after `close()`.
    #[error("channel layer is closed")]
    LayerClosed,

    /// The blocking call was abandoned before producing a result.
    #[error("operation cancelled")]
    Cancelled,

    /// One or more members of a group could not be delivered to.
    ///
    /// Every member was attempted before this error was raised.
    #[error("group send to {group:?} failed for {} member(s)", failures.len())]
    GroupSend {
        group: String,
        failures: Vec<(String, LayerError)>,
    },

    /// Rejected layer configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Protocol violation on the cross-process host connection.
    #[error("ipc error: {0}")]
    Ipc(String),

    /// Socket or thread I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Message frame could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LayerError {
    /// True for the expected, frequent outcomes callers handle inline
    /// (`ChannelFull`, `Timeout`) as opposed to faults.
    pub fn is_expected(&self) -> bool {
        matches!(self, LayerError::ChannelFull(_) | LayerError::Timeout)
    }
}

/// Result type alias for channel layer operations
pub type Result<T> = std::result::Result<T, LayerError>;
