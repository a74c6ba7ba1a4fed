//! In-process topic transport with drain-on-stop shutdown
//!
//! This library provides a registry of named, buffered channels through
//! which producers and consumers in one process exchange opaque byte
//! payloads by topic name, without an external broker. It implements the
//! broker-agnostic [`Transport`] contract, so code written against that
//! trait can later switch to a broker-backed transport.
//!
//! ```
//! use mom_transport::{MemoryConfig, MemoryTransport, Transport};
//!
//! # #[tokio::main]
//! # async fn main() -> mom_transport::Result<()> {
//! let transport = MemoryTransport::new(MemoryConfig::new("doc"))?;
//!
//! transport.send("orders")?.send("a").await?;
//!
//! let orders = transport.receive("orders")?;
//! assert_eq!(orders.recv().await.as_deref(), Some(&b"a"[..]));
//!
//! transport.stop().await;
//! assert!(orders.recv().await.is_none());
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod domain;
mod transport;

mod config;
mod error;

#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

use std::sync::{Mutex, MutexGuard};

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub use config::{MemoryConfig, DEFAULT_ERROR_CAPACITY, DEFAULT_TOPIC_CAPACITY};
pub use error::{Error, Result};

pub use transport::{
    //
    create_memory_transport,
    create_memory_transport_with_config,
    run,
    MemoryTransport,
    TopicConsumer,
};

pub(crate) use domain::TopicChannel;

// --- public re-exports
pub use domain::{
    //
    DoneSignal,
    ErrorReceiver,
    Topic,
    TopicReceiver,
    TopicSender,
    Transport,
    TransportPtr,
};
