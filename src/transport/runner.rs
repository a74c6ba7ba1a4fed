//! Topic consumer runner.
//!
//! This module provides the glue between a [`Transport`](crate::Transport)
//! and user code that consumes one topic.
//!
//! The runner is responsible for:
//! - obtaining the receive handle for a consumer-provided topic
//! - driving a receive loop over that handle
//! - dispatching each payload to user-defined logic
//! - consolidating logging and error handling for inbound messages
//!
//! It does **not** impose retry, timeout, or durability policies.
//!
//! ## Receive loop
//!
//! [`run`] spawns a task that waits for payloads. The loop yields while
//! waiting and exits when the topic is closed by transport shutdown, after
//! every payload buffered before shutdown has been handled. A running
//! consumer therefore also keeps `stop` from blocking on its topic.
//!
//! ## Error handling
//!
//! Errors returned by [`TopicConsumer::handle_message`] are logged at
//! `warn` level but do not terminate the loop; one bad message should not
//! bring down the consumer.

use bytes::Bytes;
use tokio::task::JoinHandle;

#[allow(unused_imports)]
use crate::{log_debug, log_warn, Result, Topic, Transport, TransportPtr};

/// A consumer of one topic's payloads.
///
/// Implementations should assume that other receivers of the same topic
/// compete for its payloads; each payload reaches exactly one of them.
#[async_trait::async_trait]
pub trait TopicConsumer: Send + Sync {
    /// Topic to consume.
    fn topic(&self) -> Topic;

    /// Handle a single payload.
    ///
    /// Returning an error does not terminate the receive loop.
    async fn handle_message(&self, payload: Bytes) -> Result<()>;
}

/// Start a receive loop for `consumer`.
///
/// The returned [`JoinHandle`] completes once the topic has closed and
/// every buffered payload was handled. Dropping the handle does not stop
/// the loop.
///
/// # Errors
///
/// Returns an error if the transport cannot provide the topic's receive
/// handle.
pub async fn run<T>(transport: TransportPtr, consumer: T) -> Result<JoinHandle<Result<()>>>
where
    T: TopicConsumer + 'static,
{
    // ---
    let topic = consumer.topic();
    let inbox = transport.receive(topic.as_str())?;

    log_debug!("{}: consumer attached to {topic}", transport.transport_id());

    let join = tokio::spawn(async move {
        // ---
        while let Some(payload) = inbox.recv().await {
            if let Err(_err) = consumer.handle_message(payload).await {
                log_warn!("consumer error on {}: {_err}", inbox.topic());
            }
        }
        log_debug!("topic {} closed, consumer exiting", inbox.topic());
        Ok(())
    });

    Ok(join)
}
