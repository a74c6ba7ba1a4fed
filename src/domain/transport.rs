// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the transport contract shared by every transport
//! implementation: named topics, send/receive handles onto a topic, a
//! shared error channel, and a blocking, idempotent shutdown.
//!
//! It intentionally avoids any reference to concrete brokers or client
//! libraries. Concrete implementations live under `src/transport/`.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    // ---
    DoneSignal,
    Error,
    ErrorReceiver,
    Result,
    TopicReceiver,
    TopicSender,
};

/// A topic name.
///
/// Topics are opaque identifiers; the domain layer makes no assumptions
/// about their syntax or hierarchy. Two topics are the same topic exactly
/// when their strings are equal.
///
/// Topics are immutable, cheap to clone, and safe to share across threads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(pub Arc<str>);

impl Topic {
    /// Borrow the topic name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Topic
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Topic(value.into())
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport abstraction.
///
/// A `Transport` is a registry of named topics. Producers obtain a
/// [`TopicSender`] by name, consumers a [`TopicReceiver`] by the same name;
/// both are views of one channel, created on first use.
///
/// Implementations must ensure that:
/// - `send(n)` and `receive(n)` always return handles to the same channel
///   for the same name `n`, however often and in whichever order they are
///   called, including under concurrent first use.
/// - Distinct names never share a channel.
/// - `stop()` lets consumers drain messages that were already buffered
///   before closing each topic, then closes the error channel and fires the
///   [`DoneSignal`]. Later calls are no-ops.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show
/// explicit lifetimes and a boxed `Future`. Consumers should treat the
/// async methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Identifier of this transport instance, used for logging.
    fn transport_id(&self) -> &str;

    /// Get the send handle for `topic`, creating the topic if needed.
    fn send(&self, topic: &str) -> Result<TopicSender>;

    /// Get the receive handle for `topic`, creating the topic if needed.
    fn receive(&self, topic: &str) -> Result<TopicReceiver>;

    /// Get the shared channel on which delivery failures are reported.
    ///
    /// Callers should keep draining it; it ends once the transport stopped.
    fn err_chan(&self) -> ErrorReceiver;

    /// Stop the transport.
    ///
    /// Waits until every topic has drained its buffered messages and
    /// closed. If a topic holds messages and nobody receives them, this
    /// waits forever; keeping consumers running until `stop` returns is the
    /// caller's responsibility. See [`stop_timeout`](Self::stop_timeout)
    /// for a bounded variant.
    async fn stop(&self);

    /// Signal that fires once `stop` has completed.
    fn done(&self) -> DoneSignal;

    /// Stop the transport, waiting at most `timeout` for topics to drain.
    ///
    /// Shutdown keeps progressing after a timeout; the [`DoneSignal`] still
    /// fires once the remaining topics drain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StopTimeout`] if the topics did not drain in time.
    async fn stop_timeout(&self, timeout: Duration) -> Result<()> {
        // ---
        tokio::time::timeout(timeout, self.stop())
            .await
            .map_err(|_| Error::StopTimeout(timeout))
    }
}

/// Shared transport pointer.
///
/// This is an `Arc<dyn Transport>`:
/// - `.clone()` is cheap (only increments a reference count)
/// - all clones share the same topics
/// - used to erase concrete transport types behind the domain interface
pub type TransportPtr = Arc<dyn Transport>;
