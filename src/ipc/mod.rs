// src/ipc/mod.rs

//! Cross-process store hosting over a Unix domain socket.
//!
//! A [`HostServer`] owns the authoritative state; every process that builds
//! a layer with an IPC execution context talks to it through an
//! [`IpcStore`].

mod client;
mod protocol;
mod server;

pub use client::IpcStore;
pub use server::HostServer;
