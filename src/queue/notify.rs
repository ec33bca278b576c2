// src/queue/notify.rs

//! Notification sink abstraction.
//!
//! The queue calls a [`NotificationSink`] after every state-affecting
//! mutation, always *after* releasing its lock, so a sink may call straight
//! back into the queue (e.g. to take a fresh snapshot) without deadlocking.
//!
//! Any `Fn(&QueueEvent) + Send + Sync` closure is a sink. [`ChannelSink`]
//! forwards events into a Tokio channel for async consumers.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{error, trace};

use crate::job::{JobId, JobState};

/// What changed in the queue.
///
/// Consumers typically re-render from `snapshot()`; the event just says why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// A job was appended to the pending partition.
    Submitted(JobId),
    /// The worker moved a job into the running slot.
    Started(JobId),
    /// The running job reached a terminal state and moved to history.
    Finished { id: JobId, state: JobState },
    /// A queued job was cancelled before it ever ran.
    Cancelled(JobId),
    /// Cancellation was requested for the running job.
    CancelRequested(JobId),
    /// A pending job moved to a new index.
    Reordered { id: JobId, index: usize },
    /// A finished job was removed from history.
    Removed(JobId),
    /// `remove_all_finished` removed this many jobs.
    Purged { count: usize },
}

impl QueueEvent {
    /// The job this event is about, if it concerns a single job.
    pub fn job_id(&self) -> Option<JobId> {
        match *self {
            QueueEvent::Submitted(id)
            | QueueEvent::Started(id)
            | QueueEvent::Cancelled(id)
            | QueueEvent::CancelRequested(id)
            | QueueEvent::Removed(id) => Some(id),
            QueueEvent::Finished { id, .. } | QueueEvent::Reordered { id, .. } => Some(id),
            QueueEvent::Purged { .. } => None,
        }
    }
}

/// Capability the queue uses to announce changes.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &QueueEvent);
}

impl<F> NotificationSink for F
where
    F: Fn(&QueueEvent) + Send + Sync,
{
    fn notify(&self, event: &QueueEvent) {
        self(event)
    }
}

/// Sink that forwards every event into an unbounded Tokio channel.
///
/// Sending never blocks, so it is safe to use from the worker thread. Events
/// sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<QueueEvent>) -> Self {
        Self { tx }
    }

    /// Convenience: create a sink together with its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: &QueueEvent) {
        let _ = self.tx.send(*event);
    }
}

/// Holder for the currently installed sink.
#[derive(Default)]
pub(crate) struct NotifierSlot {
    sink: RwLock<Option<Arc<dyn NotificationSink>>>,
}

impl std::fmt::Debug for NotifierSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("NotifierSlot")
            .field("installed", &installed)
            .finish()
    }
}

impl NotifierSlot {
    pub(crate) fn set(&self, sink: Arc<dyn NotificationSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    pub(crate) fn clear(&self) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Deliver `event` to the installed sink, if any.
    ///
    /// Must be called without holding the queue lock. A panicking sink is
    /// logged and otherwise ignored so it cannot take the worker down.
    pub(crate) fn emit(&self, event: QueueEvent) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(sink) = sink else {
            return;
        };

        trace!(?event, "delivering queue notification");
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| sink.notify(&event)));
        if delivered.is_err() {
            error!(?event, "notification sink panicked; event dropped");
        }
    }
}
