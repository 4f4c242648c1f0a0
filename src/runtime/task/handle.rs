use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Output slot shared between a spawned task and its [`JoinHandle`].
pub(crate) struct JoinCell<T> {
    result: RefCell<Option<T>>,
    finished: Cell<bool>,
    waiter: RefCell<Option<Waker>>,
}

impl<T> JoinCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            result: RefCell::new(None),
            finished: Cell::new(false),
            waiter: RefCell::new(None),
        }
    }

    /// Stores the task output and wakes the owner, if it is waiting.
    pub(crate) fn complete(&self, value: T) {
        *self.result.borrow_mut() = Some(value);
        self.finished.set(true);

        let waiter = self.waiter.borrow_mut().take();
        if let Some(waker) = waiter {
            waker.wake();
        }
    }
}

/// A handle to a spawned task.
///
/// A `JoinHandle` is the single owner of a task's output. It implements
/// [`Future`] and resolves once the task has completed.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
pub struct JoinHandle<T> {
    pub(crate) cell: Rc<JoinCell<T>>,
}

impl<T> JoinHandle<T> {
    /// Returns `true` once the task has produced its output.
    pub fn is_finished(&self) -> bool {
        self.cell.finished.get()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    /// Polls the join handle.
    ///
    /// If the task has already completed, its result is returned
    /// immediately. Otherwise, the current waker is registered and
    /// the future returns `Poll::Pending`.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let taken = self.cell.result.borrow_mut().take();
        if let Some(value) = taken {
            return Poll::Ready(value);
        }

        assert!(!self.is_finished(), "result already taken");

        *self.cell.waiter.borrow_mut() = Some(cx.waker().clone());
        Poll::Pending
    }
}
