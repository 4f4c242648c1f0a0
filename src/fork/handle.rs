use super::registry::{CANCELLED, ForkId};
use crate::error::Exception;
use crate::runtime::core::Handle;

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Result slot shared by a fork task and every handle to it.
pub(crate) struct ForkCell<T> {
    result: RefCell<Option<Result<T, Exception>>>,
    waiters: RefCell<Vec<Waker>>,
}

impl<T> ForkCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            result: RefCell::new(None),
            waiters: RefCell::new(Vec::new()),
        }
    }

    fn set(&self, result: Result<T, Exception>) {
        *self.result.borrow_mut() = Some(result);

        let waiters = std::mem::take(&mut *self.waiters.borrow_mut());
        for waker in waiters {
            waker.wake();
        }
    }
}

/// A shared handle to a fork's outcome.
///
/// Any number of tasks may hold clones of the handle and wait on it; the
/// fork body runs once and every waiter observes the same result or
/// exception.
pub struct ForkHandle<T> {
    id: ForkId,
    cell: Rc<ForkCell<T>>,
    handle: Handle,
}

impl<T> ForkHandle<T> {
    pub(crate) fn new(id: ForkId, cell: Rc<ForkCell<T>>, handle: Handle) -> Self {
        Self { id, cell, handle }
    }

    pub fn id(&self) -> ForkId {
        self.id
    }

    /// Returns `true` once the fork has an outcome.
    pub fn is_completed(&self) -> bool {
        self.cell.result.borrow().is_some()
    }
}

impl<T: Clone> ForkHandle<T> {
    /// Waits for the fork and returns its outcome.
    ///
    /// Waiting again, from this or another handle, returns the same outcome
    /// without running the fork again.
    pub fn wait(&self) -> ForkWait<'_, T> {
        ForkWait { fork: self }
    }

    /// Returns the outcome if the fork already has one.
    pub fn try_result(&self) -> Option<Result<T, Exception>> {
        let result = self.cell.result.borrow().clone();
        if result.is_some() {
            self.handle.forks_mut().mark_awaited(self.id);
        }
        result
    }
}

impl<T> Clone for ForkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: self.cell.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T> fmt::Debug for ForkHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkHandle")
            .field("id", &self.id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl<T> Drop for ForkHandle<T> {
    fn drop(&mut self) {
        if Rc::strong_count(&self.cell) == 1 {
            self.handle.forks_mut().release(self.id);
        }
    }
}

/// Future returned by [`ForkHandle::wait`].
pub struct ForkWait<'a, T> {
    fork: &'a ForkHandle<T>,
}

impl<T: Clone> Future for ForkWait<'_, T> {
    type Output = Result<T, Exception>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(result) = self.fork.try_result() {
            return Poll::Ready(result);
        }

        let mut waiters = self.fork.cell.waiters.borrow_mut();
        if !waiters.iter().any(|waker| waker.will_wake(cx.waker())) {
            waiters.push(cx.waker().clone());
        }

        Poll::Pending
    }
}

/// The scheduler-side half of a fork: runs the body and publishes its
/// outcome.
pub(crate) struct ForkTask<F, T> {
    id: ForkId,
    future: Pin<Box<F>>,
    cell: Rc<ForkCell<T>>,
    handle: Handle,
    completed: bool,
}

impl<F, T> ForkTask<F, T>
where
    F: Future<Output = Result<T, Exception>>,
{
    pub(crate) fn new(id: ForkId, future: F, cell: Rc<ForkCell<T>>, handle: Handle) -> Self {
        Self {
            id,
            future: Box::pin(future),
            cell,
            handle,
            completed: false,
        }
    }

    fn finish(&mut self, result: Result<T, Exception>) {
        self.completed = true;

        let exception = result.as_ref().err().cloned();
        if let Some(exception) = &exception {
            tracing::debug!(fork = self.id, %exception, "fork finished with an exception");
        }

        self.handle.forks_mut().complete(self.id, exception);
        self.cell.set(result);

        if Rc::strong_count(&self.cell) == 1 {
            self.handle.forks_mut().release(self.id);
        }
    }
}

/// Marks a fork as the running one for the duration of a poll.
struct CurrentFork<'a> {
    handle: &'a Handle,
    previous: Option<ForkId>,
}

impl Drop for CurrentFork<'_> {
    fn drop(&mut self) {
        self.handle.forks_mut().set_current(self.previous);
    }
}

impl<F, T> Future for ForkTask<F, T>
where
    F: Future<Output = Result<T, Exception>>,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        let previous = this.handle.forks_mut().set_current(Some(this.id));
        let guard = CurrentFork {
            handle: &this.handle,
            previous,
        };

        let result = match this.future.as_mut().poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        drop(guard);
        this.finish(result);

        Poll::Ready(())
    }
}

impl<F, T> Drop for ForkTask<F, T> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        tracing::debug!(fork = self.id, "fork dropped before completion");
        let exception = Exception::new(CANCELLED, format!("fork {} was cancelled", self.id));
        self.handle.forks_mut().complete(self.id, Some(exception.clone()));
        self.cell.set(Err(exception));

        if Rc::strong_count(&self.cell) == 1 {
            self.handle.forks_mut().release(self.id);
        }
    }
}
