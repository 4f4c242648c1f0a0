//! Event-driven task scheduling.
//!
//! The host delivers one event at a time; the scheduler maps it to the
//! single task registered for it and resumes that task.

mod core;
pub(crate) mod ready;
mod wait;

use crate::platform::Descriptor;

pub use self::core::Scheduler;
pub use wait::{WaitFor, WaitKey, WaitToken};

/// An event handed to [`Scheduler::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleEvent {
    /// The host asked the instance to yield.
    Yield,

    /// The host delivered an update on a tracked stream or timer.
    UpdateOnStream(Descriptor),

    /// The host opened a stream the instance did not know about.
    IncomingStream(Descriptor),

    /// The host has nothing to deliver.
    NoEvent,
}

/// Outcome of one scheduling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    /// A task was polled.
    Resumed,

    /// Nothing could be resumed for the event.
    Skipped,

    /// A resumed task faulted.
    Error,
}
