// src/transport/memory/drain.rs

//! Per-topic drain task.
//!
//! Every topic gets one background task when it is created. The task is a
//! small state machine:
//!
//! ```text
//!   Open ──stop──▶ Draining ──buffer empty, closed──▶ Closed
//!                   │    ▲
//!                   └────┘ buffer not empty
//! ```
//!
//! - `Open`: the topic accepts sends; the task waits on the transport's
//!   stopping signal.
//! - `Draining`: shutdown has begun; the task waits until consumers have
//!   received every buffered payload. Sends are still accepted.
//! - `Closed`: the topic is closed and the task ends. Terminal.
//!
//! Waiting is event driven in both states; the task never polls.
//!
//! The task only holds a weak reference to its transport. Dropping the last
//! transport handle fires the stopping signal, so topics of an abandoned
//! transport drain and close like on `stop`. A topic nobody can read from
//! anymore (no transport, no handles) is closed right away.
//!
//! If the runtime running the task shuts down before the topic closed, the
//! topic stays open and the transport respawns its drain task on the next
//! runtime that uses it.

use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::transport::Inner;

#[allow(unused_imports)]
use crate::{log_debug, TopicChannel};

/// Lifecycle state of one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DrainState {
    // ---
    Open,
    Draining,
    Closed,
}

impl DrainState {
    /// State after one observation of the stop signal and the topic.
    pub(super) fn next(self, stop_fired: bool, topic_closed: bool) -> Self {
        // ---
        match self {
            DrainState::Open if stop_fired => DrainState::Draining,
            DrainState::Open => DrainState::Open,
            DrainState::Draining if topic_closed => DrainState::Closed,
            DrainState::Draining => DrainState::Draining,
            DrainState::Closed => DrainState::Closed,
        }
    }
}

/// Reports the end of a drain task to its transport when dropped.
///
/// Owned by the drain task, so the bookkeeping also happens when the task
/// is dropped unfinished by a runtime shutting down.
struct DrainGuard {
    inner: Weak<Inner>,
    chan: Arc<TopicChannel>,
    stopping: CancellationToken,
    transport_id: String,
    completed: bool,
}

impl DrainGuard {
    // ---
    /// Close the topic if neither the transport nor any handle is left to
    /// read it.
    fn close_if_abandoned(&self) -> bool {
        // ---
        if self.inner.strong_count() > 0 || Arc::strong_count(&self.chan) > 1 {
            return false;
        }
        log_debug!(
            "{}: topic {} abandoned with {} buffered, closing",
            self.transport_id,
            self.chan.topic(),
            self.chan.len()
        );
        self.chan.close();
        true
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        // ---
        match self.inner.upgrade() {
            Some(inner) => inner.drain_ended(&self.chan, self.completed),
            None => self.chan.close(),
        }
    }
}

/// Start the drain task of `chan` on `runtime`.
pub(super) fn spawn(runtime: &Handle, inner: &Arc<Inner>, chan: Arc<TopicChannel>) {
    // ---
    let guard = DrainGuard {
        inner: Arc::downgrade(inner),
        chan,
        stopping: inner.stopping().clone(),
        transport_id: inner.transport_id().to_owned(),
        completed: false,
    };

    runtime.spawn(async move {
        let mut guard = guard;
        run(&guard).await;
        guard.completed = true;
    });
}

async fn run(guard: &DrainGuard) {
    // ---
    let chan = &guard.chan;
    let mut state = DrainState::Open;

    loop {
        let closed = state == DrainState::Draining
            && (chan.try_close() || guard.close_if_abandoned());
        let next = state.next(guard.stopping.is_cancelled(), closed);

        if next != state {
            log_debug!(
                "{}: topic {} {state:?} -> {next:?} ({} buffered)",
                guard.transport_id,
                chan.topic(),
                chan.len()
            );
            state = next;
            continue;
        }

        match state {
            DrainState::Open => guard.stopping.cancelled().await,
            DrainState::Draining => chan.drained().await,
            DrainState::Closed => break,
        }
    }
}
