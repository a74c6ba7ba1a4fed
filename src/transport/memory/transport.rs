// src/transport/memory/transport.rs

//! In-memory transport implementation.
//!
//! This file contains the topic registry and the shutdown coordinator.
//! The per-topic drain task lives in `drain.rs`.
//!
//! ## Locking
//!
//! A single `std::sync::Mutex` guards the topic map, the pending drain
//! count and the stop flags. It is never held across an `.await`, and
//! lookup-and-insert of a topic happens as one critical section so that
//! concurrent first users of a name create exactly one channel.
//!
//! ## Shutdown
//!
//! 1. `stop` marks the transport as stopping and fires the `stopping`
//!    signal; topics created from then on are born closed.
//! 2. Each drain task waits until its topic's buffer is empty, closes the
//!    topic and decrements the pending count.
//! 3. Whoever brings the count to zero (or `stop` itself, if no topic was
//!    ever created) closes the error channel and fires `done`.
//!
//! ## Runtimes
//!
//! Drain tasks run on the runtime that created their topic. When that
//! runtime shuts down first, the topic is recorded as orphaned and stays
//! open; the next lookup from inside a runtime, or `stop`, spawns a new
//! drain task for it. If the runtime goes away while the topic is draining,
//! the topic is closed as is.
//!
//! Dropping the last handle of a transport without calling `stop` fires the
//! stopping signal, so its topics drain and close on their own.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::drain;

#[allow(unused_imports)]
use crate::{
    // ---
    lock_ignore_poison,
    log_debug,
    log_error,
    log_info,
    log_warn,
    DoneSignal,
    Error,
    ErrorReceiver,
    MemoryConfig,
    Result,
    Topic,
    TopicChannel,
    TopicReceiver,
    TopicSender,
    Transport,
    TransportPtr,
};

/// Transport id of the process-wide shared instance.
const SHARED_TRANSPORT_ID: &str = "memory";

/// Process-global transport used by [`create_transport`].
static SHARED: OnceLock<Arc<MemoryTransport>> = OnceLock::new();

/// In-memory transport.
///
/// A registry of named, bounded topic channels living entirely in the
/// process. Cloning is cheap and every clone shares the same topics.
///
/// ## Semantics
///
/// - A topic is created on the first `send` or `receive` for its name and
///   lives until the transport stops.
/// - Each topic buffers up to `topic_capacity` payloads (1024 by default).
///   Senders wait when the buffer is full.
/// - `stop` closes each topic only after its buffered payloads were
///   received, then closes the error channel and fires `done`.
/// - Nothing is ever written to the error channel; it exists to satisfy
///   the [`Transport`] contract.
///
/// ## Non-Goals
///
/// - Persistence or durability
/// - Ordering across topics
/// - Network behavior or failure simulation
#[derive(Clone)]
pub struct MemoryTransport {
    // ---
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    // ---
    config: MemoryConfig,
    state: Mutex<State>,
    errors: ErrorReceiver,

    /// Fired once when shutdown begins; drain tasks wait on it.
    stopping: CancellationToken,

    /// Fired once every topic has drained and the error channel is closed.
    done: CancellationToken,
}

struct State {
    // ---
    topics: HashMap<Topic, Arc<TopicChannel>>,

    /// Drain tasks that have not closed their topic yet.
    pending: usize,

    /// Open topics whose drain task was dropped with its runtime.
    orphaned: HashSet<Topic>,

    stop_requested: bool,
    stopped: bool,

    /// Dropped on shutdown to close the error channel.
    errors_tx: Option<mpsc::Sender<Error>>,
}

impl MemoryTransport {
    // ---
    /// Create an isolated transport with its own topics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the config fails validation.
    pub fn new(config: MemoryConfig) -> Result<Self> {
        // ---
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    /// The process-wide shared transport.
    ///
    /// Created on first call; every later call returns the same instance,
    /// so all callers in the process see the same topics. Once stopped, the
    /// shared instance stays stopped.
    pub fn shared() -> Arc<MemoryTransport> {
        // ---
        SHARED
            .get_or_init(|| {
                let transport = Self::from_valid_config(MemoryConfig::new(SHARED_TRANSPORT_ID));
                Arc::new(transport)
            })
            .clone()
    }

    fn from_valid_config(config: MemoryConfig) -> Self {
        // ---
        log_debug!("{}: create memory transport", config.transport_id);

        let (errors_tx, errors_rx) = mpsc::channel(config.error_capacity);

        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    topics: HashMap::new(),
                    pending: 0,
                    orphaned: HashSet::new(),
                    stop_requested: false,
                    stopped: false,
                    errors_tx: Some(errors_tx),
                }),
                errors: ErrorReceiver::new(errors_rx),
                stopping: CancellationToken::new(),
                done: CancellationToken::new(),
            }),
        }
    }

    /// Configuration this transport was created with.
    pub fn config(&self) -> &MemoryConfig {
        &self.inner.config
    }

    /// Names of all topics created so far, sorted.
    pub fn topics(&self) -> Vec<Topic> {
        // ---
        let state = lock_ignore_poison(&self.inner.state);
        let mut topics: Vec<Topic> = state.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of topics created so far.
    pub fn topic_count(&self) -> usize {
        lock_ignore_poison(&self.inner.state).topics.len()
    }

    /// Whether `stop` has completed.
    pub fn is_stopped(&self) -> bool {
        lock_ignore_poison(&self.inner.state).stopped
    }

    /// Look up `name`, creating the topic and its drain task if absent.
    ///
    /// An existing topic whose drain task was lost with an earlier runtime
    /// gets a new one on the current runtime.
    fn topic(&self, name: &str) -> Result<Arc<TopicChannel>> {
        // ---
        let (chan, runtime) = {
            let mut state = lock_ignore_poison(&self.inner.state);

            if let Some(chan) = state.topics.get(name).cloned() {
                if !state.orphaned.contains(name) {
                    return Ok(chan);
                }
                let Ok(runtime) = Handle::try_current() else {
                    return Ok(chan);
                };
                state.orphaned.remove(name);
                state.pending += 1;
                log_debug!(
                    "{}: restarting drain task of topic {name}",
                    self.transport_id()
                );
                (chan, runtime)
            } else {
                let topic = Topic::from(name);
                let chan = TopicChannel::new(topic.clone(), self.inner.config.topic_capacity);

                if state.stop_requested {
                    // Too late to drain anything; hand out a closed topic.
                    log_debug!(
                        "{}: topic {topic} requested after stop, created closed",
                        self.transport_id()
                    );
                    chan.close();
                    state.topics.insert(topic, chan.clone());
                    return Ok(chan);
                }

                let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;

                state.pending += 1;
                state.topics.insert(topic, chan.clone());
                log_debug!("{}: created topic {name}", self.transport_id());
                (chan, runtime)
            }
        };

        // Spawned outside the lock: a runtime that is shutting down drops
        // the task right away, and the drain guard then re-locks the state.
        drain::spawn(&runtime, &self.inner, chan.clone());

        Ok(chan)
    }

    /// Mark shutdown as started. Only the first call has any effect.
    fn begin_stop(&self) {
        // ---
        let (finish_now, restart) = {
            let mut state = lock_ignore_poison(&self.inner.state);
            if state.stop_requested {
                return;
            }
            state.stop_requested = true;

            let runtime = Handle::try_current().ok();
            let mut restart = Vec::new();
            for topic in std::mem::take(&mut state.orphaned) {
                let Some(chan) = state.topics.get(&topic).cloned() else {
                    continue;
                };
                match &runtime {
                    Some(runtime) => restart.push((runtime.clone(), chan)),
                    None => chan.close(),
                }
            }
            state.pending += restart.len();

            log_info!(
                "{}: stopping, draining {} topic(s)",
                self.transport_id(),
                state.pending
            );
            (state.pending == 0, restart)
        };

        self.inner.stopping.cancel();

        for (runtime, chan) in restart {
            drain::spawn(&runtime, &self.inner, chan);
        }

        if finish_now {
            self.inner.finish();
        }
    }
}

impl Inner {
    // ---
    pub(super) fn transport_id(&self) -> &str {
        &self.config.transport_id
    }

    pub(super) fn stopping(&self) -> &CancellationToken {
        &self.stopping
    }

    /// Called by each drain task when it ends.
    ///
    /// `completed` is false when the task was dropped with its runtime
    /// before the topic closed.
    pub(super) fn drain_ended(&self, chan: &TopicChannel, completed: bool) {
        // ---
        let finish_now = {
            let mut state = lock_ignore_poison(&self.state);
            state.pending = state.pending.saturating_sub(1);

            if !completed && !state.stop_requested {
                log_warn!(
                    "{}: drain task of topic {} dropped with its runtime",
                    self.transport_id(),
                    chan.topic()
                );
                state.orphaned.insert(chan.topic().clone());
                return;
            }

            chan.close();
            log_debug!(
                "{}: topic {} closed, {} pending",
                self.transport_id(),
                chan.topic(),
                state.pending
            );
            state.stop_requested && state.pending == 0
        };

        if finish_now {
            self.finish();
        }
    }

    /// Close the error channel and fire `done`. Runs exactly once.
    fn finish(&self) {
        // ---
        let errors_tx = {
            let mut state = lock_ignore_poison(&self.state);
            state.stopped = true;
            state.errors_tx.take()
        };
        drop(errors_tx);

        self.done.cancel();
        log_info!("{}: stopped", self.transport_id());
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // ---
        // Release the registry's channel references first, so drain tasks
        // can tell which topics nobody can read anymore.
        let topics = std::mem::take(&mut lock_ignore_poison(&self.state).topics);
        drop(topics);

        if !self.stopping.is_cancelled() {
            log_debug!("{}: dropped without stop", self.transport_id());
            self.stopping.cancel();
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn transport_id(&self) -> &str {
        self.inner.transport_id()
    }

    /// Get the send view of `topic`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] if the topic is new and no Tokio runtime
    /// is available to run its drain task.
    fn send(&self, topic: &str) -> Result<TopicSender> {
        self.topic(topic).map(TopicSender::new)
    }

    /// Get the receive view of `topic`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] if the topic is new and no Tokio runtime
    /// is available to run its drain task.
    fn receive(&self, topic: &str) -> Result<TopicReceiver> {
        self.topic(topic).map(TopicReceiver::new)
    }

    fn err_chan(&self) -> ErrorReceiver {
        self.inner.errors.clone()
    }

    /// Stop the transport and wait until every topic has drained.
    ///
    /// Concurrent and repeated calls are safe: only the first one starts
    /// the shutdown, and every call returns once it has completed.
    async fn stop(&self) {
        // ---
        self.begin_stop();
        self.inner.done.cancelled().await;
    }

    fn done(&self) -> DoneSignal {
        DoneSignal::new(self.inner.done.clone())
    }
}

/// Get the process-wide in-memory transport.
///
/// All callers share a single topic registry. Suitable for production use
/// and simple single-test scenarios; for isolated parallel tests, use
/// [`create_memory_transport_with_config`](crate::create_memory_transport_with_config).
///
/// # Errors
///
/// Currently infallible: always returns `Ok`.
pub async fn create_transport() -> Result<TransportPtr> {
    // ---
    let transport: TransportPtr = MemoryTransport::shared();
    Ok(transport)
}

/// Create an isolated in-memory transport from `config`.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the config fails validation.
pub async fn create_transport_with_config(config: MemoryConfig) -> Result<TransportPtr> {
    // ---
    let transport = MemoryTransport::new(config)?;
    Ok(Arc::new(transport))
}
