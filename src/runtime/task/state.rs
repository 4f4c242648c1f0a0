/// Task is idle and not scheduled.
///
/// The task is suspended on some wait key and sits in the task table.
pub(crate) const IDLE: usize = 0;

/// Task is queued for execution.
///
/// The task has been woken and is waiting in the ready queue.
pub(crate) const QUEUED: usize = 1;

/// Task is currently being polled by the scheduler.
pub(crate) const RUNNING: usize = 2;

/// Task has completed or was dropped.
///
/// The future will not be polled again and wakers become no-ops.
pub(crate) const COMPLETED: usize = 3;

/// Task has been woken while running.
///
/// The task is re-queued once the current poll returns `Poll::Pending`.
pub(crate) const NOTIFIED: usize = 4;
