// src/transport/memory/mod.rs

//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the
//! domain-level `Transport` trait. It is the reference for transport
//! semantics and needs no external resources.
//!
//! ## Reference Semantics
//!
//! - One channel per topic name; `send` and `receive` are two views of it.
//! - Topics are created lazily on first use, exactly once even under
//!   concurrent first use.
//! - Payloads of one topic are delivered in FIFO order. Nothing is dropped
//!   due to timing or scheduling.
//! - `stop` drains before it closes: payloads buffered when shutdown begins
//!   remain receivable until consumed.
//!
//! ## Non-Goals
//!
//! This transport does not emulate the failure modes, persistence, or
//! delivery guarantees of any specific broker.

mod drain;
mod transport;

pub use transport::{create_transport, create_transport_with_config, MemoryTransport};
