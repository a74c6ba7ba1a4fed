//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! transport implementations.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod channel;
mod transport;

// --- Transport domain re-exports ---

pub(crate) use channel::TopicChannel;

pub use channel::{
    //
    DoneSignal,
    ErrorReceiver,
    TopicReceiver,
    TopicSender,
};

pub use transport::{
    //
    Topic,
    Transport,
    TransportPtr,
};
