use super::handle::{JoinCell, JoinHandle};
use super::state::{COMPLETED, IDLE, NOTIFIED, QUEUED, RUNNING};
use crate::runtime::core::Handle;
use crate::runtime::scheduler::ready::ReadyQueue;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// A type-erased task body as stored by the scheduler.
pub(crate) type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// The wakeable part of a task.
///
/// The header is shared between the task table and every waker created for
/// the task. It tracks the lifecycle state and knows how to push the task
/// back onto the ready queue.
pub(crate) struct TaskHeader {
    /// Slot of the task in the scheduler's task table.
    pub(crate) index: usize,

    /// The current lifecycle state of the task (IDLE, RUNNING, etc.).
    pub(crate) state: AtomicUsize,

    /// Ready queue the task is pushed to when woken.
    ready: Weak<ReadyQueue>,
}

impl TaskHeader {
    /// Creates a header for a freshly spawned task.
    ///
    /// The task starts `QUEUED`: the caller pushes it to the ready queue.
    pub(crate) fn new(index: usize, ready: &Arc<ReadyQueue>) -> Self {
        Self {
            index,
            state: AtomicUsize::new(QUEUED),
            ready: Arc::downgrade(ready),
        }
    }

    /// Signals the task to be rescheduled.
    ///
    /// If the task is `IDLE`, it moves to `QUEUED` and is pushed to the ready queue.
    /// If the task is `RUNNING`, it moves to `NOTIFIED` to ensure it is re-queued
    /// right after its current poll.
    pub(crate) fn wake(self: &Arc<Self>) {
        loop {
            let state = self.state.load(Ordering::Acquire);

            match state {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, QUEUED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        if let Some(ready) = self.ready.upgrade() {
                            ready.push(self.clone());
                        }
                        return;
                    }
                }
                RUNNING => {
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                // Already queued, notified or finished: nothing to do.
                _ => return,
            }
        }
    }

    /// Moves a task that just returned `Poll::Pending` out of `RUNNING`.
    ///
    /// A task notified during its poll goes straight back to the ready queue.
    pub(crate) fn park(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.state.store(QUEUED, Ordering::Release);
            if let Some(ready) = self.ready.upgrade() {
                ready.push(self.clone());
            }
        }
    }

    pub(crate) fn complete(&self) {
        self.state.store(COMPLETED, Ordering::Release);
    }
}

/// An entry of the scheduler's task table.
pub(crate) struct TaskSlot {
    pub(crate) header: Arc<TaskHeader>,

    /// The task body; taken out of the slot while it is being polled.
    pub(crate) future: Option<LocalFuture>,
}

impl Handle {
    /// Spawns a single-owner task onto the instance.
    ///
    /// The task starts running on the next scheduling pass. Its output can
    /// be awaited exactly once through the returned [`JoinHandle`]; dropping
    /// the handle does **not** cancel the task.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let task = handle.spawn(async { 42 });
    /// assert_eq!(task.await, 42);
    /// ```
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + 'static,
        T: 'static,
    {
        let cell = Rc::new(JoinCell::new());
        let output = cell.clone();

        self.scheduler().spawn(Box::pin(async move {
            output.complete(future.await);
        }));

        JoinHandle { cell }
    }
}
