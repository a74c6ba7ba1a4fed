//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait, exposed through constructor functions, and the
//! consumer runner that drives any of them.
//!
//! Domain code must not depend on transport-specific types.

mod memory;
mod runner;

pub use memory::{
    //
    create_transport as create_memory_transport,
    create_transport_with_config as create_memory_transport_with_config,
    MemoryTransport,
};

pub use runner::{run, TopicConsumer};
