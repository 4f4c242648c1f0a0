//! Forks: independently awaitable child tasks with shared results.
//!
//! A fork runs its body once as a task of its own. Its outcome, a value or
//! an [`Exception`], is kept until every [`ForkHandle`] and the fork task
//! itself are gone, so any number of tasks can wait on it.

mod handle;
mod registry;

pub use handle::{ForkHandle, ForkWait};
pub(crate) use registry::ForkRegistry;
pub use registry::{ForkId, ForkInfo};

use crate::error::{Exception, invariant_violation};
use crate::runtime::core::Handle;
use crate::time::sleep;

use handle::{ForkCell, ForkTask};

use std::any::Any;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Passed to a fork body when it starts.
#[derive(Clone, Debug)]
pub struct ForkContext {
    id: ForkId,
    handle: Handle,
}

impl ForkContext {
    pub fn id(&self) -> ForkId {
        self.id
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// The registry entry of this fork.
    pub fn info(&self) -> ForkInfo {
        match self.handle.fork_info(self.id) {
            Some(info) => info,
            None => invariant_violation(format!("fork {} is running but not registered", self.id)),
        }
    }
}

impl Handle {
    /// Starts `body` as a new fork.
    ///
    /// Ids are handed out sequentially from `0` within an instance. The body
    /// starts running on a later scheduling pass.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let (id, fork) = handle.create_fork(|context| async move { Ok(context.id() * 2) });
    /// assert_eq!(fork.wait().await, Ok(id * 2));
    /// ```
    pub fn create_fork<F, Fut, T>(&self, body: F) -> (ForkId, ForkHandle<T>)
    where
        F: FnOnce(ForkContext) -> Fut + 'static,
        Fut: Future<Output = Result<T, Exception>> + 'static,
        T: 'static,
    {
        let cell = Rc::new(ForkCell::new());
        let erased: Weak<dyn Any> = Rc::downgrade(&cell) as Weak<dyn Any>;
        let id = self.forks_mut().register(erased);

        let context = ForkContext {
            id,
            handle: self.clone(),
        };
        let task = ForkTask::new(id, body(context), cell.clone(), self.clone());
        self.scheduler().spawn(Box::pin(task));
        tracing::debug!(fork = id, "started a fork");

        (id, ForkHandle::new(id, cell, self.clone()))
    }

    /// Same as [`create_fork`](Self::create_fork), keeping only the handle.
    pub fn fork<F, Fut, T>(&self, body: F) -> ForkHandle<T>
    where
        F: FnOnce(ForkContext) -> Fut + 'static,
        Fut: Future<Output = Result<T, Exception>> + 'static,
        T: 'static,
    {
        self.create_fork(body).1
    }

    /// A snapshot of a fork's registry entry, while it is still tracked.
    pub fn fork_info(&self, id: ForkId) -> Option<ForkInfo> {
        self.forks().get(id).cloned()
    }

    /// The fork whose body is running right now, if any.
    pub fn current_fork_id(&self) -> Option<ForkId> {
        self.forks().current()
    }

    /// The registry entry of the running fork.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a fork body.
    pub fn current_fork_info(&self) -> ForkInfo {
        let Some(id) = self.current_fork_id() else {
            invariant_violation("no fork is running");
        };

        match self.fork_info(id) {
            Some(info) => info,
            None => invariant_violation(format!("current fork {id} is not registered")),
        }
    }

    /// Number of forks still tracked by the instance.
    pub fn fork_count(&self) -> usize {
        self.forks().len()
    }

    /// Runs `callback` in a detached fork once `timeout_ms` milliseconds
    /// have passed.
    ///
    /// A negative timeout is rejected with a warning and nothing is
    /// scheduled.
    pub fn set_timer_callback<F>(&self, timeout_ms: i64, callback: F)
    where
        F: FnOnce() + 'static,
    {
        let Ok(timeout_ms) = u64::try_from(timeout_ms) else {
            tracing::warn!(timeout_ms, "can't set a timer for a negative duration");
            return;
        };

        let _detached: ForkHandle<()> = self.fork(move |_| async move {
            match sleep(Duration::from_millis(timeout_ms)).await {
                Ok(()) => {
                    callback();
                    Ok(())
                }
                Err(error) => Err(Exception::new("TimerError", error.to_string())),
            }
        });
    }
}
