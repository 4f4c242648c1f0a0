use super::ready::ReadyQueue;
use super::wait::{WaitKey, WaitTable, WaitToken};
use super::{ScheduleEvent, ScheduleStatus};
use crate::error::InvariantViolation;
use crate::platform::Descriptor;
use crate::runtime::task::state::RUNNING;
use crate::runtime::task::waker::{make_waker, task_of};
use crate::runtime::task::{LocalFuture, TaskHeader, TaskSlot};
use crate::utils::Slab;

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll, Waker};

/// Single-threaded cooperative scheduler.
///
/// The `Scheduler` is responsible for:
/// - owning every live task of the instance,
/// - recording which task waits for which external event,
/// - resuming at most one task per event it is handed,
/// - containing faults of individual tasks.
///
/// Tasks are only ever polled from [`schedule`](Self::schedule), one at a
/// time; none of the scheduler's tables is borrowed while a task runs, so a
/// task is free to spawn, suspend and release other registrations.
pub struct Scheduler {
    /// Every task that has not completed yet.
    tasks: RefCell<Slab<TaskSlot>>,

    /// Tasks that were woken and can make progress without a host event.
    ready: Arc<ReadyQueue>,

    /// Tasks blocked on a host event or on an explicit turn.
    waits: RefCell<WaitTable>,
}

impl Scheduler {
    /// Creates a scheduler with room for `capacity` tasks before it grows.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            tasks: RefCell::new(Slab::new(capacity)),
            ready: Arc::new(ReadyQueue::new()),
            waits: RefCell::new(WaitTable::default()),
        }
    }

    /// Registers a new task; it runs on a later scheduling pass.
    pub(crate) fn spawn(&self, future: LocalFuture) {
        let mut tasks = self.tasks.borrow_mut();

        let header = Arc::new(TaskHeader::new(tasks.next_index(), &self.ready));
        let index = tasks.insert(TaskSlot {
            header: header.clone(),
            future: Some(future),
        });
        debug_assert_eq!(index, header.index);

        drop(tasks);
        self.ready.push(header);
    }

    /// Advances the instance in response to one event.
    ///
    /// At most one task is resumed per call. An event nobody waits for is
    /// reported as [`ScheduleStatus::Skipped`], never as an error.
    pub fn schedule(&self, event: ScheduleEvent) -> ScheduleStatus {
        match event {
            ScheduleEvent::Yield => self.resume(WaitKey::Reschedule),
            ScheduleEvent::UpdateOnStream(descriptor) => {
                let waiter = self
                    .take_waiter(WaitKey::Stream(descriptor))
                    .or_else(|| self.take_waiter(WaitKey::Timer(descriptor)));

                match waiter {
                    Some(waker) => self.run_waiter(waker),
                    None => {
                        tracing::trace!(%descriptor, "update without a waiting task");
                        ScheduleStatus::Skipped
                    }
                }
            }
            ScheduleEvent::IncomingStream(_) => self.resume(WaitKey::IncomingStream),
            ScheduleEvent::NoEvent => match self.run_next() {
                // Tasks parked for a turn get one once nothing else can run.
                ScheduleStatus::Skipped => self.resume(WaitKey::Reschedule),
                status => status,
            },
        }
    }

    /// Returns `true` once every task has completed.
    pub fn done(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Number of tasks that have not completed yet.
    pub fn task_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Number of live wait registrations.
    pub fn waiting_count(&self) -> usize {
        self.waits.borrow().len()
    }

    /// Returns `true` if a task is registered under `key`.
    pub fn is_waiting(&self, key: WaitKey) -> bool {
        self.waits.borrow().is_waiting(key)
    }

    /// Registers the task owning `waker` as blocked on `key`.
    ///
    /// # Panics
    ///
    /// Panics if another task already waits on the same stream or timer.
    pub fn suspend(&self, key: WaitKey, waker: &Waker) -> WaitToken {
        self.waits.borrow_mut().register(key, waker)
    }

    /// Returns `true` while the registration is still waiting for its event.
    pub fn refresh(&self, key: WaitKey, token: WaitToken, waker: &Waker) -> bool {
        self.waits.borrow_mut().refresh(key, token, waker)
    }

    pub fn cancel(&self, key: WaitKey, token: WaitToken) {
        self.waits.borrow_mut().cancel(key, token);
    }

    /// Drops the registrations on a descriptor that is being released.
    pub(crate) fn forget_descriptor(&self, descriptor: Descriptor) -> bool {
        self.waits.borrow_mut().forget(descriptor)
    }

    /// Drops every task without resuming it again.
    ///
    /// Task bodies are destroyed after the tables are emptied, so whatever
    /// they release while dropping finds the scheduler in a consistent state.
    pub(crate) fn abort_all(&self) {
        let slots = self.tasks.borrow_mut().drain();
        self.ready.clear();
        self.waits.borrow_mut().clear();

        for slot in &slots {
            slot.header.complete();
        }

        if !slots.is_empty() {
            tracing::debug!(tasks = slots.len(), "aborting unfinished tasks");
        }
        drop(slots);
    }

    fn take_waiter(&self, key: WaitKey) -> Option<Waker> {
        self.waits.borrow_mut().take(key)
    }

    /// Runs the oldest waiter on `key`.
    fn resume(&self, key: WaitKey) -> ScheduleStatus {
        match self.take_waiter(key) {
            Some(waker) => self.run_waiter(waker),
            None => ScheduleStatus::Skipped,
        }
    }

    /// Polls the task a released registration belonged to, ahead of any
    /// task already in the ready queue.
    fn run_waiter(&self, waker: Waker) -> ScheduleStatus {
        let Some(header) = task_of(&waker) else {
            waker.wake();
            return self.run_next();
        };

        match self.claim(&header) {
            Some(future) => self.run(header, future),
            None => ScheduleStatus::Skipped,
        }
    }

    /// Polls the first runnable task in the ready queue.
    fn run_next(&self) -> ScheduleStatus {
        while let Some(header) = self.ready.pop() {
            if let Some(future) = self.claim(&header) {
                return self.run(header, future);
            }
        }

        ScheduleStatus::Skipped
    }

    /// Takes the body of a queued task out of its slot.
    ///
    /// Headers of completed tasks, or of slots that were reused since the
    /// header was queued, are stale and yield nothing.
    fn claim(&self, header: &Arc<TaskHeader>) -> Option<LocalFuture> {
        let mut tasks = self.tasks.borrow_mut();

        match tasks.get_mut(header.index) {
            Some(slot) if Arc::ptr_eq(&slot.header, header) => slot.future.take(),
            _ => None,
        }
    }

    fn run(&self, header: Arc<TaskHeader>, mut future: LocalFuture) -> ScheduleStatus {
        header.state.store(RUNNING, Ordering::Release);

        let waker = make_waker(header.clone());
        let mut cx = Context::from_waker(&waker);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));

        match outcome {
            Ok(Poll::Pending) => {
                let mut tasks = self.tasks.borrow_mut();

                match tasks.get_mut(header.index) {
                    Some(slot) if Arc::ptr_eq(&slot.header, &header) => {
                        slot.future = Some(future);
                        drop(tasks);
                        header.park();
                    }
                    // Aborted while it was running.
                    _ => {
                        drop(tasks);
                        drop(future);
                    }
                }

                ScheduleStatus::Resumed
            }
            Ok(Poll::Ready(())) => {
                self.release(&header);
                drop(future);

                ScheduleStatus::Resumed
            }
            Err(payload) => {
                if payload.is::<InvariantViolation>() {
                    panic::resume_unwind(payload);
                }

                tracing::error!(
                    task = header.index,
                    "task faulted while resuming: {}",
                    panic_message(payload.as_ref())
                );
                self.release(&header);
                drop(future);

                ScheduleStatus::Error
            }
        }
    }

    fn release(&self, header: &Arc<TaskHeader>) {
        header.complete();

        let mut tasks = self.tasks.borrow_mut();
        let owned = matches!(tasks.get_mut(header.index), Some(slot) if Arc::ptr_eq(&slot.header, header));
        if owned {
            tasks.remove(header.index);
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.ready.clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
