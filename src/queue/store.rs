// src/queue/store.rs

//! Mutex/condvar guarded job store.
//!
//! The store holds three partitions:
//! - `pending`: FIFO of queued jobs, reorderable by callers
//! - `running`: at most one job, owned by the worker while it executes
//! - `history`: append-only list of terminal jobs, in completion order
//!
//! Every job lives in exactly one partition. All caller-facing operations
//! take the lock for the duration of a collection operation only and never
//! block on the external process. Notifications are emitted after the lock
//! has been released.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::job::{Completion, Job, JobId, JobRecord, JobSpec, JobState};
use crate::queue::notify::{NotificationSink, NotifierSlot, QueueEvent};

#[derive(Debug, Default)]
struct Partitions {
    pending: VecDeque<JobRecord>,
    running: Option<JobRecord>,
    history: Vec<JobRecord>,
}

impl Partitions {
    fn pending_index(&self, id: JobId) -> Option<usize> {
        self.pending.iter().position(|rec| rec.id() == id)
    }

    fn history_index(&self, id: JobId) -> Option<usize> {
        self.history.iter().position(|rec| rec.id() == id)
    }
}

/// Sizes of the three partitions at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCounts {
    pub pending: usize,
    pub running: usize,
    pub history: usize,
}

impl QueueCounts {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.history
    }
}

/// What the worker needs to run the job it just dequeued.
#[derive(Debug, Clone)]
pub(crate) struct Dispatch {
    pub id: JobId,
    pub spec: JobSpec,
    pub cancel: Arc<AtomicBool>,
}

/// Thread-safe ordered job collection shared by callers and the worker.
#[derive(Debug)]
pub struct QueueStore {
    inner: Mutex<Partitions>,
    /// Signalled when pending work appears, the running slot frees up, or
    /// shutdown is requested.
    work: Condvar,
    next_id: AtomicU64,
    shutdown: AtomicBool,
    notifier: NotifierSlot,
}

impl Default for QueueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Partitions::default()),
            work: Condvar::new(),
            next_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            notifier: NotifierSlot::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Partitions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_notifier(&self, sink: Arc<dyn NotificationSink>) {
        self.notifier.set(sink);
    }

    pub fn clear_notifier(&self) {
        self.notifier.clear();
    }

    /// Append a job to the tail of the pending partition and wake the worker.
    ///
    /// No validation is performed on the spec.
    pub fn submit(&self, spec: JobSpec) -> Job {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let record = JobRecord::new(id, spec);
        let view = record.view();

        {
            let mut parts = self.lock();
            parts.pending.push_back(record);
            self.work.notify_all();
        }

        info!(
            job_id = %id,
            input = %view.input_path.display(),
            output = %view.output_path.display(),
            "job submitted"
        );
        self.notifier.emit(QueueEvent::Submitted(id));
        view
    }

    /// Cancel a job.
    ///
    /// - Queued: moved to history as `Cancelled` immediately.
    /// - Running: the cancellation flag is set; the worker terminates the
    ///   process on its next poll.
    /// - Terminal or unknown: returns `false`.
    pub fn cancel(&self, id: JobId) -> bool {
        let event = {
            let mut parts = self.lock();

            if let Some(idx) = parts.pending_index(id) {
                let Some(mut record) = parts.pending.remove(idx) else {
                    return false;
                };
                if let Err(err) = record.transition(JobState::Cancelled) {
                    error!(job_id = %id, error = %err, "queued job refused cancellation");
                    parts.pending.insert(idx, record);
                    return false;
                }
                parts.history.push(record);
                QueueEvent::Cancelled(id)
            } else if let Some(running) = parts.running.as_ref().filter(|r| r.id() == id) {
                running.request_cancel();
                QueueEvent::CancelRequested(id)
            } else {
                debug!(job_id = %id, "cancel ignored: job is finished or unknown");
                return false;
            }
        };

        info!(job_id = %id, ?event, "cancel accepted");
        self.notifier.emit(event);
        true
    }

    /// Move a pending job to `new_index` (clamped to the pending length).
    ///
    /// Returns `false` without side effects if the job is not pending.
    pub fn reorder(&self, id: JobId, new_index: usize) -> bool {
        let index = {
            let mut parts = self.lock();
            let Some(current) = parts.pending_index(id) else {
                return false;
            };
            let Some(record) = parts.pending.remove(current) else {
                return false;
            };
            let index = new_index.min(parts.pending.len());
            parts.pending.insert(index, record);
            index
        };

        debug!(job_id = %id, index, "job reordered");
        self.notifier.emit(QueueEvent::Reordered { id, index });
        true
    }

    /// Remove a single finished job from history.
    pub fn remove_completed(&self, id: JobId) -> bool {
        {
            let mut parts = self.lock();
            let Some(idx) = parts.history_index(id) else {
                return false;
            };
            if !parts.history[idx].state().is_terminal() {
                return false;
            }
            parts.history.remove(idx);
        }

        debug!(job_id = %id, "finished job removed from history");
        self.notifier.emit(QueueEvent::Removed(id));
        true
    }

    /// Remove every finished job from history, returning how many were removed.
    pub fn remove_all_finished(&self) -> usize {
        let count = {
            let mut parts = self.lock();
            let before = parts.history.len();
            parts.history.retain(|rec| !rec.state().is_terminal());
            before - parts.history.len()
        };

        if count > 0 {
            debug!(count, "purged finished jobs");
            self.notifier.emit(QueueEvent::Purged { count });
        }
        count
    }

    /// Point-in-time copy: running job, then pending in queue order, then
    /// history in completion order.
    pub fn snapshot(&self) -> Vec<Job> {
        let parts = self.lock();
        let mut jobs =
            Vec::with_capacity(parts.pending.len() + parts.history.len() + 1);
        jobs.extend(parts.running.iter().map(JobRecord::view));
        jobs.extend(parts.pending.iter().map(JobRecord::view));
        jobs.extend(parts.history.iter().map(JobRecord::view));
        jobs
    }

    /// Look up a single job by id.
    pub fn get(&self, id: JobId) -> Option<Job> {
        let parts = self.lock();
        parts
            .running
            .iter()
            .chain(parts.pending.iter())
            .chain(parts.history.iter())
            .find(|rec| rec.id() == id)
            .map(JobRecord::view)
    }

    pub fn counts(&self) -> QueueCounts {
        let parts = self.lock();
        QueueCounts {
            pending: parts.pending.len(),
            running: usize::from(parts.running.is_some()),
            history: parts.history.len(),
        }
    }

    /// True when nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        let parts = self.lock();
        parts.pending.is_empty() && parts.running.is_none()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Ask the worker to stop dequeuing; wakes it if it is waiting.
    /// Id of the job in the running slot, if any.
    pub(crate) fn running_id(&self) -> Option<JobId> {
        self.lock().running.as_ref().map(JobRecord::id)
    }

    pub(crate) fn request_shutdown(&self) {
        let _parts = self.lock();
        self.shutdown.store(true, Ordering::SeqCst);
        self.work.notify_all();
    }

    /// Block until there is a pending job and the running slot is free, then
    /// move the head of `pending` into the running slot.
    ///
    /// Wakes at least every `idle_wake` to observe shutdown. Returns `None`
    /// once shutdown has been requested.
    pub(crate) fn wait_for_next(&self, idle_wake: Duration) -> Option<Dispatch> {
        let mut parts = self.lock();

        let dispatch = loop {
            if self.is_shutdown() {
                debug!("worker observed shutdown while waiting for work");
                return None;
            }

            if parts.running.is_none() {
                if let Some(mut record) = parts.pending.pop_front() {
                    if let Err(err) = record.transition(JobState::Running) {
                        error!(job_id = %record.id(), error = %err, "job cannot start; cancelling it");
                        let note = format!("could not start: {err}");
                        if let Err(err) = record.finish(Completion::cancelled(Some(note))) {
                            error!(job_id = %record.id(), error = %err, "job cannot be cancelled either");
                        }
                        if record.state().is_terminal() {
                            parts.history.push(record);
                        }
                        continue;
                    }
                    let dispatch = Dispatch {
                        id: record.id(),
                        spec: record.spec(),
                        cancel: record.cancel_flag(),
                    };
                    parts.running = Some(record);
                    break dispatch;
                }
            }

            parts = self
                .work
                .wait_timeout(parts, idle_wake)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        };
        drop(parts);

        info!(job_id = %dispatch.id, input = %dispatch.spec.input_path.display(), "job started");
        self.notifier.emit(QueueEvent::Started(dispatch.id));
        Some(dispatch)
    }

    /// Record the running job's terminal state and move it to history.
    pub(crate) fn finish_running(&self, id: JobId, completion: Completion) {
        let state = {
            let mut parts = self.lock();
            let Some(mut record) = parts.running.take_if(|rec| rec.id() == id) else {
                error!(job_id = %id, "finish_running called for a job that is not running");
                return;
            };

            if let Err(err) = record.finish(completion) {
                error!(job_id = %id, error = %err, "could not record job completion");
            }
            let state = record.state();
            parts.history.push(record);
            self.work.notify_all();
            state
        };

        self.notifier.emit(QueueEvent::Finished { id, state });
    }

    /// Output path of a job, if known.
    pub(crate) fn output_path_of(&self, id: JobId) -> Option<std::path::PathBuf> {
        let parts = self.lock();
        parts
            .running
            .iter()
            .chain(parts.pending.iter())
            .chain(parts.history.iter())
            .find(|rec| rec.id() == id)
            .map(|rec| rec.output_path().to_path_buf())
    }
}
