// src/ipc/server.rs

//! Store host server.
//!
//! Serves one [`LocalStore`] to any number of local processes over a Unix
//! domain socket. Every accepted connection gets its own thread, so a client
//! blocked in `receive` ties up only that thread while the store's own
//! per-channel locking keeps everything else moving.

use std::collections::HashMap;
use std::io::{BufReader, ErrorKind};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::protocol::{read_frame, write_frame, HostRequest, HostResponse};
use crate::store::lock_ignore_poison;

#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    LayerError,
    LocalStore,
    Result,
    StoreHost,
};

type Registry = Arc<Mutex<HashMap<u64, UnixStream>>>;

/// Cross-process store host.
///
/// Dropping the server shuts it down.
pub struct HostServer {
    // ---
    socket_path: PathBuf,
    store: Arc<LocalStore>,
    stopping: Arc<AtomicBool>,
    connections: Registry,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl HostServer {
    /// Serve a fresh store on `socket_path`.
    pub fn bind(socket_path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_store(socket_path, LocalStore::new())
    }

    /// Serve `store` on `socket_path`.
    ///
    /// A leftover socket file from a dead host is replaced; a live host on
    /// the same path is an error.
    pub fn bind_with_store(socket_path: impl AsRef<Path>, store: Arc<LocalStore>) -> Result<Self> {
        // ---
        let socket_path = socket_path.as_ref().to_path_buf();

        if socket_path.exists() {
            if UnixStream::connect(&socket_path).is_ok() {
                return Err(LayerError::Io(std::io::Error::new(
                    ErrorKind::AddrInUse,
                    format!("a store host is already serving {}", socket_path.display()),
                )));
            }
            std::fs::remove_file(&socket_path)?;
        }

        let listener = UnixListener::bind(&socket_path)?;
        let stopping = Arc::new(AtomicBool::new(false));
        let connections: Registry = Arc::new(Mutex::new(HashMap::new()));

        let acceptor = {
            let store = store.clone();
            let stopping = stopping.clone();
            let connections = connections.clone();
            thread::Builder::new()
                .name("channel-host-accept".into())
                .spawn(move || accept_loop(listener, store, stopping, connections))?
        };

        log_info!("store host listening on {}", socket_path.display());

        Ok(Self {
            socket_path,
            store,
            stopping,
            connections,
            acceptor: Mutex::new(Some(acceptor)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// The store being served, for in-process callers sharing it.
    pub fn store(&self) -> Arc<LocalStore> {
        self.store.clone()
    }

    /// Number of client connections currently open.
    pub fn connection_count(&self) -> usize {
        lock_ignore_poison(&self.connections).len()
    }

    /// Stop serving: close the store, drop every client and remove the
    /// socket file. Idempotent.
    pub fn shutdown(&self) -> Result<()> {
        // ---
        if self.stopping.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.store.close()?;

        let open: Vec<_> = lock_ignore_poison(&self.connections).drain().collect();
        for (_, stream) in open {
            let _ = stream.shutdown(Shutdown::Both);
        }

        // wake the acceptor so it observes `stopping`
        let _ = UnixStream::connect(&self.socket_path);
        let acceptor = lock_ignore_poison(&self.acceptor).take();
        if let Some(acceptor) = acceptor {
            if acceptor.join().is_err() {
                log_error!("store host acceptor panicked");
            }
        }

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        log_info!("store host on {} stopped", self.socket_path.display());
        Ok(())
    }
}

impl Drop for HostServer {
    fn drop(&mut self) {
        if let Err(_err) = self.shutdown() {
            log_warn!("store host shutdown failed: {_err}");
        }
    }
}

fn accept_loop(
    listener: UnixListener,
    store: Arc<LocalStore>,
    stopping: Arc<AtomicBool>,
    connections: Registry,
) {
    // ---
    let mut next_id: u64 = 0;

    for stream in listener.incoming() {
        if stopping.load(Ordering::Acquire) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(_err) => {
                log_warn!("store host accept failed: {_err}");
                continue;
            }
        };

        let id = next_id;
        next_id += 1;
        if let Err(_err) = register(&connections, &stopping, id, &stream) {
            log_debug!("store host dropped connection {id}: {_err}");
            continue;
        }

        let store = store.clone();
        let registry = connections.clone();
        let spawned = thread::Builder::new()
            .name(format!("channel-host-conn-{id}"))
            .spawn(move || {
                if let Err(_err) = serve_connection(&store, stream) {
                    log_debug!("connection {id} ended: {_err}");
                }
                lock_ignore_poison(&registry).remove(&id);
            });
        if let Err(_err) = spawned {
            log_error!("store host could not spawn connection thread: {_err}");
            lock_ignore_poison(&connections).remove(&id);
        }
    }
}

/// Track `stream` so `shutdown` can disconnect it.
///
/// `stopping` is checked under the registry lock: `shutdown` sets it before
/// draining, so a stream accepted during the drain is refused here instead
/// of being served after it.
fn register(connections: &Registry, stopping: &AtomicBool, id: u64, stream: &UnixStream) -> Result<()> {
    // ---
    let clone = stream.try_clone()?;
    let mut open = lock_ignore_poison(connections);
    if stopping.load(Ordering::Acquire) {
        drop(open);
        let _ = stream.shutdown(Shutdown::Both);
        return Err(LayerError::LayerClosed);
    }
    open.insert(id, clone);
    Ok(())
}

fn serve_connection(store: &LocalStore, stream: UnixStream) -> Result<()> {
    // ---
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    while let Some(request) = read_frame::<_, HostRequest>(&mut reader)? {
        let response = dispatch(store, request);
        write_frame(&mut writer, &response)?;
    }
    Ok(())
}

fn dispatch(store: &LocalStore, request: HostRequest) -> HostResponse {
    // ---
    match request {
        HostRequest::Send {
            channel,
            message,
            ttl,
            capacity,
        } => HostResponse::from_result(store.send(&channel, message, ttl, capacity), |()| {
            HostResponse::Done
        }),
        HostRequest::Receive {
            channel,
            timeout,
            capacity,
        } => HostResponse::from_result(
            store.receive(&channel, timeout, capacity),
            HostResponse::Message,
        ),
        HostRequest::GroupAdd { group, channel } => {
            HostResponse::from_result(store.group_add(&group, &channel), |()| HostResponse::Done)
        }
        HostRequest::GroupDiscard { group, channel } => HostResponse::from_result(
            store.group_discard(&group, &channel),
            |()| HostResponse::Done,
        ),
        HostRequest::GroupMembers { group } => {
            HostResponse::from_result(store.group_members(&group), HostResponse::Members)
        }
        HostRequest::SweepExpired { group_expiry } => {
            HostResponse::from_result(store.sweep_expired(group_expiry), HostResponse::Swept)
        }
        HostRequest::ChannelDepth { channel } => {
            HostResponse::from_result(store.channel_depth(&channel), HostResponse::Depth)
        }
        HostRequest::Flush => HostResponse::from_result(store.flush(), |()| HostResponse::Done),
    }
}
