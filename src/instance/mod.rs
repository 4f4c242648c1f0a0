//! Instance state and the host update pump.
//!
//! An [`Instance`] owns one execution of the script: its descriptors, its
//! task tree and its lifecycle. The host drives it by calling
//! [`Instance::poll`] whenever it has updates to deliver or was asked to
//! call back.

mod lifecycle;
mod protocol;
mod streams;

pub use lifecycle::{ImageKind, InstanceKind, LifecycleState};
pub(crate) use lifecycle::Lifecycle;
pub use protocol::{Frontend, NoopFrontend, RequestKind, StreamDisposition};
pub(crate) use streams::StreamTable;

use crate::platform::PollStatus;
use crate::runtime::context::enter_context;
use crate::runtime::core::Handle;
use crate::runtime::scheduler::{ScheduleEvent, ScheduleStatus};

use std::cell::Cell;

/// One execution of the script inside the host.
///
/// Built with [`InstanceBuilder`](crate::InstanceBuilder). Dropping the
/// instance drops every unfinished task and releases every stream.
pub struct Instance {
    handle: Handle,

    /// A shutdown was restarted after the task running it faulted.
    recovering: Cell<bool>,
}

impl Instance {
    pub(crate) fn new(handle: Handle) -> Self {
        Self {
            handle,
            recovering: Cell::new(false),
        }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Processes host updates until the host has to take over again.
    ///
    /// Every event is handed to the scheduler; the loop ends when the host
    /// asks for a yield, when nothing can progress without a new update,
    /// or once the instance has shut down.
    ///
    /// A faulting task fails the request, but the instance still runs its
    /// shutdown phase before reporting [`PollStatus::FinishedError`].
    pub fn poll(&self) -> PollStatus {
        enter_context(self.handle.clone(), || self.process_platform_updates())
    }

    fn process_platform_updates(&self) -> PollStatus {
        let handle = &self.handle;
        let platform = handle.platform();

        loop {
            if platform.please_yield() {
                tracing::debug!("platform asked for a yield");
                let status = handle.schedule(ScheduleEvent::Yield);
                self.check(status);
                return PollStatus::Reschedule;
            }

            match platform.take_update() {
                Some(descriptor) if handle.is_open(descriptor) => {
                    tracing::debug!(%descriptor, "got an update on a stream");
                    let status = handle.schedule(ScheduleEvent::UpdateOnStream(descriptor));
                    self.check(status);
                }
                Some(descriptor) => {
                    tracing::debug!(%descriptor, "got an incoming stream");
                    handle.streams_mut().push_incoming(descriptor);
                    let status = handle.schedule(ScheduleEvent::IncomingStream(descriptor));
                    self.check(status);
                }
                None => {
                    tracing::trace!("got no updates from the platform");
                    match handle.schedule(ScheduleEvent::NoEvent) {
                        ScheduleStatus::Resumed => {}
                        ScheduleStatus::Error => self.check(ScheduleStatus::Error),
                        ScheduleStatus::Skipped => {
                            if let Some(status) = self.settle() {
                                return status;
                            }
                        }
                    }
                }
            }
        }
    }

    /// A faulted task fails the request; pumping goes on so the shutdown
    /// phase still runs.
    fn check(&self, status: ScheduleStatus) {
        if status == ScheduleStatus::Error {
            self.handle.mark_failed();
        }
    }

    /// Decides what to report once nothing is runnable.
    ///
    /// Returns `None` when more work was scheduled and pumping has to go on.
    fn settle(&self) -> Option<PollStatus> {
        let handle = &self.handle;
        let state = handle.lifecycle_state();

        if !handle.done() {
            if state != LifecycleState::Finished {
                return Some(PollStatus::Blocked);
            }

            // Streams are gone: whatever still waits can never be resumed.
            tracing::debug!(tasks = handle.scheduler().task_count(), "dropping tasks left after shutdown");
            handle.scheduler().abort_all();
        }

        if state != LifecycleState::Finished {
            // The task running the shutdown phase faulted before finishing it.
            if self.recovering.replace(true) {
                handle.abandon_shutdown();
            } else {
                tracing::warn!(?state, "every task is done but the instance did not shut down");
                let epilogue = handle.clone();
                handle.scheduler().spawn(Box::pin(async move {
                    epilogue.epilogue(true).await;
                }));
                return None;
            }
        }

        Some(if handle.is_failed() {
            PollStatus::FinishedError
        } else {
            PollStatus::FinishedOk
        })
    }

    /// Abandons every running task and runs the shutdown phase in their
    /// place.
    ///
    /// Used when the host interrupts the instance, e.g. on a deadline. The
    /// shutdown phase runs as a fresh task on the following polls.
    pub fn force_shutdown(&self) {
        tracing::warn!(tasks = self.handle.scheduler().task_count(), "forcing instance shutdown");

        enter_context(self.handle.clone(), || self.handle.scheduler().abort_all());

        let handle = self.handle.clone();
        self.handle.scheduler().spawn(Box::pin(async move {
            handle.epilogue(true).await;
        }));
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // Tasks hold handles to the instance; dropping them breaks the cycle.
        enter_context(self.handle.clone(), || {
            self.handle.scheduler().abort_all();
            self.handle.drain_shutdown_functions();
            self.handle.release_all_streams();
        });
    }
}
