use crate::runtime::task::TaskHeader;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Queue of tasks that can make progress without an external event.
///
/// Wakers push task headers here; the scheduler pops them in FIFO order.
/// The queue sits behind a mutex only because [`Waker`](std::task::Waker)
/// must be `Send + Sync`; all pushes and pops happen on the instance thread.
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<Arc<TaskHeader>>>,
}

impl ReadyQueue {
    /// Creates an empty ready queue.
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<TaskHeader>>> {
        // A task that panicked mid-poll must not take the queue down with it.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes a woken task to the back of the queue.
    pub(crate) fn push(&self, task: Arc<TaskHeader>) {
        self.lock().push_back(task);
    }

    /// Pops the oldest woken task.
    pub(crate) fn pop(&self) -> Option<Arc<TaskHeader>> {
        self.lock().pop_front()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }
}
