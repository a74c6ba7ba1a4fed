//! Configuration for the in-memory transport.
//!
//! The defaults reproduce the reference behavior: 1024-slot topic buffers
//! and a small shared error channel. Values are fixed when a topic is
//! created; changing a config never resizes existing channels.

use serde::Deserialize;
use uuid::Uuid;

use crate::{Error, Result};

/// Default number of buffered messages per topic.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// Default number of buffered errors on the shared error channel.
pub const DEFAULT_ERROR_CAPACITY: usize = 16;

/// In-memory transport configuration.
///
/// Can be built in code with the `with_*` setters or deserialized from any
/// serde format; missing fields take their defaults.
///
/// # Example
///
/// ```
/// use mom_transport::MemoryConfig;
///
/// let config = MemoryConfig::new("orders-node").with_topic_capacity(64);
/// assert_eq!(config.topic_capacity, 64);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    // ---
    /// Identifier for this transport instance, used for logging.
    pub transport_id: String,

    /// Buffer capacity of every topic channel.
    pub topic_capacity: usize,

    /// Buffer capacity of the shared error channel.
    pub error_capacity: usize,
}

impl MemoryConfig {
    /// Create a config with the given transport id and default capacities.
    pub fn new(transport_id: impl Into<String>) -> Self {
        Self {
            transport_id: transport_id.into(),
            topic_capacity: DEFAULT_TOPIC_CAPACITY,
            error_capacity: DEFAULT_ERROR_CAPACITY,
        }
    }

    /// Set the per-topic buffer capacity.
    pub fn with_topic_capacity(mut self, capacity: usize) -> Self {
        self.topic_capacity = capacity;
        self
    }

    /// Set the error channel buffer capacity.
    pub fn with_error_capacity(mut self, capacity: usize) -> Self {
        self.error_capacity = capacity;
        self
    }

    /// Check that both capacities are usable channel bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either capacity is zero.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.topic_capacity == 0 {
            return Err(Error::InvalidConfig("topic_capacity must be > 0".into()));
        }
        if self.error_capacity == 0 {
            return Err(Error::InvalidConfig("error_capacity must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    /// Defaults with a generated `memory-<uuid>` transport id.
    fn default() -> Self {
        Self::new(format!("memory-{}", Uuid::new_v4()))
    }
}
