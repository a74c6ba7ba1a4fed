// src/domain/channel.rs

//! Topic channel and the handles handed out by transports.
//!
//! A [`TopicChannel`] is one bounded FIFO queue of payloads. Transports keep
//! exactly one per topic name and give out two views of it:
//!
//! - [`TopicSender`] for producers,
//! - [`TopicReceiver`] for consumers.
//!
//! All receivers of a topic compete for the same queue; a payload is
//! delivered to exactly one of them. Closing is one-way: once a channel is
//! closed, sends fail and receivers return `None` after the buffer is empty.
//!
//! ## Send / close ordering
//!
//! Accepting a payload and closing the channel both happen under the
//! `buffered` lock. A send either lands in the buffer before the close, and
//! is counted, or observes the close and fails. A graceful close
//! ([`TopicChannel::try_close`]) only succeeds while the count is zero, so a
//! payload acknowledged with `Ok` is never stranded behind a close.

use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::{lock_ignore_poison, Error, Result, Topic};

/// Shared state behind every handle of one topic.
pub(crate) struct TopicChannel {
    // ---
    topic: Topic,
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<mpsc::Receiver<Bytes>>,

    /// Payloads accepted but not yet received.
    buffered: StdMutex<usize>,

    closed: CancellationToken,

    /// Posted when the buffer empties or a handle is dropped.
    drained: Notify,
}

impl TopicChannel {
    // ---
    /// Create an open channel with a fixed buffer capacity.
    pub(crate) fn new(topic: Topic, capacity: usize) -> Arc<Self> {
        // ---
        let (tx, rx) = mpsc::channel(capacity);
        Arc::new(Self {
            topic,
            tx,
            rx: Mutex::new(rx),
            buffered: StdMutex::new(0),
            closed: CancellationToken::new(),
            drained: Notify::new(),
        })
    }

    pub(crate) fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Number of buffered, not yet received payloads.
    pub(crate) fn len(&self) -> usize {
        *lock_ignore_poison(&self.buffered)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Close the channel even if payloads are still buffered. Idempotent.
    ///
    /// Buffered payloads stay receivable.
    pub(crate) fn close(&self) {
        // ---
        let _buffered = lock_ignore_poison(&self.buffered);
        self.closed.cancel();
    }

    /// Close the channel if its buffer is empty.
    ///
    /// Returns `true` if the channel is closed afterwards. Once this returns
    /// `true` no payload can enter the buffer again.
    pub(crate) fn try_close(&self) -> bool {
        // ---
        let buffered = lock_ignore_poison(&self.buffered);
        if *buffered == 0 {
            self.closed.cancel();
        }
        self.closed.is_cancelled()
    }

    /// Wait until a receiver empties the buffer or a handle is dropped.
    ///
    /// Wakeups are permit based: an event that happened before this call is
    /// not lost. Callers must re-check the state they are waiting for.
    pub(crate) async fn drained(&self) {
        self.drained.notified().await;
    }

    /// Commit a payload into a reserved slot, unless the channel closed
    /// while the slot was being reserved.
    fn push(&self, permit: mpsc::Permit<'_, Bytes>, payload: Bytes) -> Result<()> {
        // ---
        let mut buffered = lock_ignore_poison(&self.buffered);
        if self.is_closed() {
            return Err(Error::TopicClosed(self.topic.clone()));
        }
        *buffered += 1;
        permit.send(payload);
        Ok(())
    }

    fn try_push(&self, payload: Bytes) -> Result<()> {
        // ---
        let mut buffered = lock_ignore_poison(&self.buffered);
        if self.is_closed() {
            return Err(Error::TopicClosed(self.topic.clone()));
        }
        match self.tx.try_send(payload) {
            Ok(()) => {
                *buffered += 1;
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(Error::TopicFull(self.topic.clone())),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(Error::TopicClosed(self.topic.clone()))
            }
        }
    }

    fn after_receive(&self) {
        // ---
        let mut buffered = lock_ignore_poison(&self.buffered);
        *buffered = buffered.saturating_sub(1);
        if *buffered == 0 {
            self.drained.notify_one();
        }
    }

    fn handle_dropped(&self) {
        self.drained.notify_one();
    }
}

/// Send-only handle to a topic channel.
///
/// Cheap to clone; all clones feed the same queue.
#[derive(Clone)]
pub struct TopicSender {
    chan: Arc<TopicChannel>,
}

impl TopicSender {
    // ---
    pub(crate) fn new(chan: Arc<TopicChannel>) -> Self {
        Self { chan }
    }

    /// Topic this handle sends to.
    pub fn topic(&self) -> &Topic {
        self.chan.topic()
    }

    /// Whether the topic has been closed by shutdown.
    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Send a payload, waiting for buffer space if the topic is full.
    ///
    /// With no receiver attached and a full buffer this waits until the
    /// topic is closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TopicClosed`] if the topic is closed.
    pub async fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        // ---
        let payload = payload.into();
        let permit = tokio::select! {
            biased;
            _ = self.chan.closed.cancelled() => None,
            permit = self.chan.tx.reserve() => permit.ok(),
        };

        match permit {
            Some(permit) => self.chan.push(permit, payload),
            None => Err(Error::TopicClosed(self.topic().clone())),
        }
    }

    /// Send a payload without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::TopicClosed`] if the topic is closed
    /// - [`Error::TopicFull`] if the buffer has no free slot
    pub fn try_send(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.chan.try_push(payload.into())
    }

    /// Whether `other` feeds the same underlying channel.
    pub fn same_channel(&self, other: &TopicSender) -> bool {
        Arc::ptr_eq(&self.chan, &other.chan)
    }
}

impl Drop for TopicSender {
    fn drop(&mut self) {
        self.chan.handle_dropped();
    }
}

impl fmt::Debug for TopicSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicSender")
            .field("topic", self.topic())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receive-only handle to a topic channel.
///
/// Cheap to clone. Clones compete for messages: each payload is received
/// by exactly one of them, in FIFO order.
#[derive(Clone)]
pub struct TopicReceiver {
    chan: Arc<TopicChannel>,
}

impl TopicReceiver {
    // ---
    pub(crate) fn new(chan: Arc<TopicChannel>) -> Self {
        Self { chan }
    }

    /// Topic this handle receives from.
    pub fn topic(&self) -> &Topic {
        self.chan.topic()
    }

    /// Receive the next payload.
    ///
    /// Returns `None` once the topic is closed and its buffer is empty.
    /// Payloads buffered before shutdown are still returned.
    pub async fn recv(&self) -> Option<Bytes> {
        // ---
        let mut rx = self.chan.rx.lock().await;

        let payload = tokio::select! {
            biased;
            payload = rx.recv() => payload,
            _ = self.chan.closed.cancelled() => rx.try_recv().ok(),
        };

        if payload.is_some() {
            self.chan.after_receive();
        }
        payload
    }

    /// Receive a payload if one is buffered, without waiting.
    ///
    /// Returns `None` if the buffer is empty or another receiver currently
    /// holds the queue.
    pub fn try_recv(&self) -> Option<Bytes> {
        // ---
        let mut rx = self.chan.rx.try_lock().ok()?;
        let payload = rx.try_recv().ok();

        if payload.is_some() {
            self.chan.after_receive();
        }
        payload
    }

    /// Number of buffered payloads.
    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chan.is_empty()
    }

    /// Whether the topic has been closed by shutdown.
    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Whether `other` reads from the same underlying channel.
    pub fn same_channel(&self, other: &TopicReceiver) -> bool {
        Arc::ptr_eq(&self.chan, &other.chan)
    }

    /// Whether `sender` feeds this receiver's channel.
    pub fn is_fed_by(&self, sender: &TopicSender) -> bool {
        Arc::ptr_eq(&self.chan, &sender.chan)
    }
}

impl Drop for TopicReceiver {
    fn drop(&mut self) {
        self.chan.handle_dropped();
    }
}

impl fmt::Debug for TopicReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicReceiver")
            .field("topic", self.topic())
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receive-only handle to a transport's shared error channel.
///
/// `recv` returns `None` once the transport has stopped and every
/// reported error has been received.
#[derive(Clone)]
pub struct ErrorReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Error>>>,
}

impl ErrorReceiver {
    // ---
    pub(crate) fn new(rx: mpsc::Receiver<Error>) -> Self {
        Self {
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Receive the next reported error.
    pub async fn recv(&self) -> Option<Error> {
        self.rx.lock().await.recv().await
    }
}

impl fmt::Debug for ErrorReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReceiver").finish_non_exhaustive()
    }
}

/// Signal that fires once when a transport has fully stopped.
///
/// Cloneable; every clone observes the same signal.
#[derive(Clone, Debug)]
pub struct DoneSignal {
    token: CancellationToken,
}

impl DoneSignal {
    // ---
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Wait until the transport has stopped. Returns immediately afterwards.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }
}
