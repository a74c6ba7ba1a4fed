use std::time::Duration;

use thiserror::Error;

use crate::Topic;

/// Errors that can occur during transport operations
#[derive(Error, Debug)]
pub enum Error {
    /// The topic channel was closed by a completed drain
    #[error("topic closed: {0}")]
    TopicClosed(Topic),

    /// Non-blocking send found the topic buffer full
    #[error("topic buffer full: {0}")]
    TopicFull(Topic),

    /// A new topic was requested outside a Tokio runtime
    #[error("no Tokio runtime available to spawn the topic drain task")]
    NoRuntime,

    /// `stop_timeout` gave up before every topic drained
    #[error("stop timed out after {0:?} waiting for topics to drain")]
    StopTimeout(Duration),

    /// Delivery failure reported asynchronously through the error channel
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;
