// src/ipc/client.rs

//! Store host client for a [`HostServer`](super::HostServer).

use std::collections::HashMap;
use std::io::BufReader;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::protocol::{read_frame, write_frame, HostRequest, HostResponse};
use crate::store::lock_ignore_poison;

#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_warn,
    LayerError,
    Message,
    Result,
    StoreHost,
    SweepReport,
};

struct Connection {
    id: u64,
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Connection {
    fn round_trip(&mut self, request: &HostRequest) -> Result<HostResponse> {
        write_frame(&mut self.writer, request)?;
        read_frame(&mut self.reader)?
            .ok_or_else(|| LayerError::Ipc("host closed the connection".into()))
    }
}

/// Store host living in another process.
///
/// Each call checks a connection out of a small pool, so concurrent callers
/// never interleave frames on one socket and a blocked receive occupies only
/// its own connection. Closing shuts every socket down, which unblocks any
/// call still waiting on the host.
pub struct IpcStore {
    // ---
    socket_path: PathBuf,
    idle: Mutex<Vec<Connection>>,
    // clones of every open socket, for shutdown on close
    live: Mutex<HashMap<u64, UnixStream>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl IpcStore {
    /// Connect to the host listening on `socket_path`.
    ///
    /// One connection is opened eagerly so an unreachable host fails here
    /// rather than on first use.
    pub fn connect(socket_path: impl AsRef<Path>) -> Result<Arc<Self>> {
        // ---
        let store = Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            idle: Mutex::new(Vec::new()),
            live: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };
        let first = store.open()?;
        lock_ignore_poison(&store.idle).push(first);

        log_debug!("connected to store host at {}", store.socket_path.display());
        Ok(Arc::new(store))
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    fn open(&self) -> Result<Connection> {
        // ---
        let stream = UnixStream::connect(&self.socket_path)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock_ignore_poison(&self.live).insert(id, stream.try_clone()?);

        Ok(Connection {
            id,
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }

    fn checkout(&self) -> Result<Connection> {
        let pooled = lock_ignore_poison(&self.idle).pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => self.open(),
        }
    }

    fn checkin(&self, conn: Connection) {
        if self.closed.load(Ordering::Acquire) {
            self.forget(conn);
        } else {
            lock_ignore_poison(&self.idle).push(conn);
        }
    }

    fn forget(&self, conn: Connection) {
        lock_ignore_poison(&self.live).remove(&conn.id);
        let _ = conn.writer.shutdown(Shutdown::Both);
    }

    fn call(&self, request: HostRequest) -> Result<HostResponse> {
        // ---
        if self.closed.load(Ordering::Acquire) {
            return Err(LayerError::LayerClosed);
        }

        let mut conn = self.checkout()?;
        match conn.round_trip(&request) {
            Ok(response) => {
                self.checkin(conn);
                Ok(response)
            }
            Err(err) => {
                // the stream may hold half a frame; never reuse it
                self.forget(conn);
                if self.closed.load(Ordering::Acquire) {
                    Err(LayerError::LayerClosed)
                } else {
                    log_warn!("store host call failed: {err}");
                    Err(err)
                }
            }
        }
    }
}

impl StoreHost for IpcStore {
    // ---
    fn send(&self, channel: &str, message: Message, ttl: Duration, capacity: usize) -> Result<()> {
        self.call(HostRequest::Send {
            channel: channel.to_string(),
            message,
            ttl,
            capacity,
        })?
        .into_done()
    }

    fn receive(&self, channel: &str, timeout: Option<Duration>, capacity: usize) -> Result<Message> {
        self.call(HostRequest::Receive {
            channel: channel.to_string(),
            timeout,
            capacity,
        })?
        .into_message()
    }

    fn group_add(&self, group: &str, channel: &str) -> Result<()> {
        self.call(HostRequest::GroupAdd {
            group: group.to_string(),
            channel: channel.to_string(),
        })?
        .into_done()
    }

    fn group_discard(&self, group: &str, channel: &str) -> Result<()> {
        self.call(HostRequest::GroupDiscard {
            group: group.to_string(),
            channel: channel.to_string(),
        })?
        .into_done()
    }

    fn group_members(&self, group: &str) -> Result<Vec<String>> {
        self.call(HostRequest::GroupMembers {
            group: group.to_string(),
        })?
        .into_members()
    }

    fn sweep_expired(&self, group_expiry: Duration) -> Result<SweepReport> {
        self.call(HostRequest::SweepExpired { group_expiry })?
            .into_sweep()
    }

    fn channel_depth(&self, channel: &str) -> Result<Option<usize>> {
        self.call(HostRequest::ChannelDepth {
            channel: channel.to_string(),
        })?
        .into_depth()
    }

    fn flush(&self) -> Result<()> {
        self.call(HostRequest::Flush)?.into_done()
    }

    /// Disconnect from the host. The host and its state stay up for other
    /// clients.
    fn close(&self) -> Result<()> {
        // ---
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        lock_ignore_poison(&self.idle).clear();
        let live: Vec<_> = lock_ignore_poison(&self.live).drain().collect();
        for (_, stream) in live {
            let _ = stream.shutdown(Shutdown::Both);
        }
        log_debug!("disconnected from store host at {}", self.socket_path.display());
        Ok(())
    }
}
