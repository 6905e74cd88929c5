//! Domain layer public interface.
//!
//! Abstractions shared by the facade and the store hosts, independent of
//! where channel state actually lives.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod layer;
mod store;

pub use layer::{
    //
    Layer,
    LayerPtr,
};

pub use store::{
    //
    Message,
    StoreHost,
    StoreHostPtr,
    SweepReport,
};
