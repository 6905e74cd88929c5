// src/ipc/protocol.rs

//! Host wire protocol.
//!
//! One JSON object per line in each direction. A connection carries one
//! request at a time: the client writes a [`HostRequest`] and blocks until
//! the matching [`HostResponse`] line arrives.

use std::io::{BufRead, Write};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{LayerError, Message, Result, SweepReport};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum HostRequest {
    Send {
        channel: String,
        message: Message,
        ttl: Duration,
        capacity: usize,
    },
    Receive {
        channel: String,
        timeout: Option<Duration>,
        capacity: usize,
    },
    GroupAdd {
        group: String,
        channel: String,
    },
    GroupDiscard {
        group: String,
        channel: String,
    },
    GroupMembers {
        group: String,
    },
    SweepExpired {
        group_expiry: Duration,
    },
    ChannelDepth {
        channel: String,
    },
    Flush,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub(crate) enum HostResponse {
    Done,
    Message(Message),
    Members(Vec<String>),
    Swept(SweepReport),
    Depth(Option<usize>),
    Fault(Fault),
}

/// Errors that cross the socket. Anything the host cannot classify travels
/// as `Other` with its display text.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub(crate) enum Fault {
    ChannelFull(String),
    Timeout,
    Closed,
    Other(String),
}

impl From<LayerError> for Fault {
    fn from(err: LayerError) -> Self {
        match err {
            LayerError::ChannelFull(channel) => Fault::ChannelFull(channel),
            LayerError::Timeout => Fault::Timeout,
            LayerError::LayerClosed => Fault::Closed,
            other => Fault::Other(other.to_string()),
        }
    }
}

impl From<Fault> for LayerError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::ChannelFull(channel) => LayerError::ChannelFull(channel),
            Fault::Timeout => LayerError::Timeout,
            Fault::Closed => LayerError::LayerClosed,
            Fault::Other(detail) => LayerError::Ipc(detail),
        }
    }
}

impl HostResponse {
    /// Wrap a host call's outcome.
    pub fn from_result<T>(result: Result<T>, wrap: impl FnOnce(T) -> HostResponse) -> Self {
        match result {
            Ok(value) => wrap(value),
            Err(err) => HostResponse::Fault(err.into()),
        }
    }

    fn unexpected(&self) -> LayerError {
        LayerError::Ipc(format!("unexpected host response: {self:?}"))
    }

    pub fn into_done(self) -> Result<()> {
        match self {
            HostResponse::Done => Ok(()),
            HostResponse::Fault(fault) => Err(fault.into()),
            other => Err(other.unexpected()),
        }
    }

    pub fn into_message(self) -> Result<Message> {
        match self {
            HostResponse::Message(message) => Ok(message),
            HostResponse::Fault(fault) => Err(fault.into()),
            other => Err(other.unexpected()),
        }
    }

    pub fn into_members(self) -> Result<Vec<String>> {
        match self {
            HostResponse::Members(members) => Ok(members),
            HostResponse::Fault(fault) => Err(fault.into()),
            other => Err(other.unexpected()),
        }
    }

    pub fn into_sweep(self) -> Result<SweepReport> {
        match self {
            HostResponse::Swept(report) => Ok(report),
            HostResponse::Fault(fault) => Err(fault.into()),
            other => Err(other.unexpected()),
        }
    }

    pub fn into_depth(self) -> Result<Option<usize>> {
        match self {
            HostResponse::Depth(depth) => Ok(depth),
            HostResponse::Fault(fault) => Err(fault.into()),
            other => Err(other.unexpected()),
        }
    }
}

/// Write one frame and flush it.
pub(crate) fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
    W: Write,
    T: Serialize,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Read one frame; `None` when the peer closed the connection.
pub(crate) fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: BufRead,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line.trim_end())?))
}
