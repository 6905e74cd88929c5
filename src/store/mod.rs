// src/store/mod.rs

//! In-process store host implementation.
//!
//! This module provides [`LocalStore`], the reference implementation of the
//! domain-level [`StoreHost`](crate::StoreHost) trait, built from three
//! pieces:
//!
//! - `queue`: the bounded, expiring FIFO behind each channel
//! - `channels`: name → queue map with lazy creation and idle removal
//! - `groups`: name → member map with per-membership join times
//!
//! ## Locking
//!
//! Each queue and each group carries its own mutex. Each map carries one
//! coarser mutex that guards only presence checks, inserts and removals, and
//! is never held while a consumer waits on a queue. Lock order is map before
//! entry, so operations on distinct channels or groups never contend beyond
//! that brief map lookup.
//!
//! ## Reference semantics
//!
//! The cross-process host serves a `LocalStore` unchanged; anything observable
//! through it is observable through `IpcStore` as well.

mod channels;
mod groups;
mod local;
mod queue;

pub use local::LocalStore;

pub(crate) use queue::lock_ignore_poison;
