use crate::fork::ForkRegistry;
use crate::instance::{Frontend, ImageKind, Lifecycle, StreamTable};
use crate::platform::Platform;
use crate::runtime::context::{enter_context, try_current};
use crate::runtime::scheduler::{ScheduleEvent, ScheduleStatus, Scheduler};
use crate::runtime::task::LocalFuture;

use std::cell::{Ref, RefCell, RefMut};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

type ShutdownFunction = Box<dyn FnOnce() -> LocalFuture>;

/// State shared by everything running inside one instance.
///
/// Each table sits in its own cell and is only borrowed for the duration of
/// a single bookkeeping operation, never across a task poll.
pub(crate) struct Core {
    pub(crate) platform: Rc<dyn Platform>,
    pub(crate) scheduler: Scheduler,
    pub(crate) streams: RefCell<StreamTable>,
    pub(crate) forks: RefCell<ForkRegistry>,
    pub(crate) lifecycle: RefCell<Lifecycle>,
    pub(crate) shutdown_functions: RefCell<VecDeque<ShutdownFunction>>,
    pub(crate) output: RefCell<Vec<u8>>,
    pub(crate) frontend: RefCell<Box<dyn Frontend>>,
}

/// A cheap, clonable reference to a running instance.
///
/// Every runtime operation available to script code hangs off a `Handle`:
/// streams, timers, forks, spawning and the shutdown hooks.
#[derive(Clone)]
pub struct Handle {
    pub(crate) core: Rc<Core>,
}

impl Handle {
    pub(crate) fn new(
        platform: Rc<dyn Platform>,
        image_kind: ImageKind,
        frontend: Box<dyn Frontend>,
        task_capacity: usize,
    ) -> Self {
        let core = Core {
            platform,
            scheduler: Scheduler::new(task_capacity),
            streams: RefCell::new(StreamTable::default()),
            forks: RefCell::new(ForkRegistry::default()),
            lifecycle: RefCell::new(Lifecycle::new(image_kind)),
            shutdown_functions: RefCell::new(VecDeque::new()),
            output: RefCell::new(Vec::new()),
            frontend: RefCell::new(frontend),
        };

        Self {
            core: Rc::new(core),
        }
    }

    /// Returns the handle of the instance the caller runs in.
    ///
    /// # Panics
    ///
    /// Panics if called outside of an instance.
    pub fn current() -> Self {
        match try_current() {
            Some(handle) => handle,
            None => panic!("Handle::current() called outside of an instance"),
        }
    }

    /// Returns the handle of the instance the caller runs in, if any.
    pub fn try_current() -> Option<Self> {
        try_current()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.core.scheduler
    }

    pub fn platform(&self) -> &dyn Platform {
        self.core.platform.as_ref()
    }

    /// Feeds one event to the scheduler, with this instance installed as
    /// the current one while tasks run.
    pub fn schedule(&self, event: ScheduleEvent) -> ScheduleStatus {
        enter_context(self.clone(), || self.core.scheduler.schedule(event))
    }

    /// Returns `true` once every task of the instance has completed.
    pub fn done(&self) -> bool {
        self.core.scheduler.done()
    }

    /// Appends bytes to the script output.
    ///
    /// CLI images write the output to the standard stream at the end of
    /// the run.
    pub fn echo(&self, bytes: impl AsRef<[u8]>) {
        self.core.output.borrow_mut().extend_from_slice(bytes.as_ref());
    }

    /// A copy of everything echoed so far.
    pub fn output(&self) -> Vec<u8> {
        self.core.output.borrow().clone()
    }

    pub(crate) fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.core.output.borrow_mut())
    }

    /// Registers a function to run during the shutdown phase.
    ///
    /// Shutdown functions run in registration order, once, before the
    /// instance releases its streams. A function registered while shutdown
    /// is in progress still runs.
    pub fn register_shutdown_function<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let function: ShutdownFunction = Box::new(move || Box::pin(f()));
        self.core.shutdown_functions.borrow_mut().push_back(function);
    }

    pub(crate) fn next_shutdown_function(&self) -> Option<ShutdownFunction> {
        self.core.shutdown_functions.borrow_mut().pop_front()
    }

    /// Drops every pending shutdown function, returning how many there were.
    pub(crate) fn drain_shutdown_functions(&self) -> usize {
        let functions = std::mem::take(&mut *self.core.shutdown_functions.borrow_mut());
        functions.len()
    }

    pub(crate) fn streams(&self) -> Ref<'_, StreamTable> {
        self.core.streams.borrow()
    }

    pub(crate) fn streams_mut(&self) -> RefMut<'_, StreamTable> {
        self.core.streams.borrow_mut()
    }

    pub(crate) fn forks(&self) -> Ref<'_, ForkRegistry> {
        self.core.forks.borrow()
    }

    pub(crate) fn forks_mut(&self) -> RefMut<'_, ForkRegistry> {
        self.core.forks.borrow_mut()
    }

    pub(crate) fn lifecycle(&self) -> Ref<'_, Lifecycle> {
        self.core.lifecycle.borrow()
    }

    pub(crate) fn lifecycle_mut(&self) -> RefMut<'_, Lifecycle> {
        self.core.lifecycle.borrow_mut()
    }

    pub(crate) fn frontend_mut(&self) -> RefMut<'_, Box<dyn Frontend>> {
        self.core.frontend.borrow_mut()
    }

    /// Returns `true` if both handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("tasks", &self.core.scheduler.task_count())
            .field("waiting", &self.core.scheduler.waiting_count())
            .finish()
    }
}
