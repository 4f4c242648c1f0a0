//! # lightrt
//!
//! **lightrt** is a cooperative, single-threaded task runtime for request-handling
//! images hosted by a platform that exposes only a narrow, non-blocking,
//! update-polling ABI.
//!
//! The host owns the event loop. It hands updates to an [`Instance`] one poll at a
//! time; the instance maps every update to the single task waiting for it, runs
//! whatever became runnable, and reports back whether the host should wait, call
//! again, or tear the instance down.
//!
//! On top of the scheduler, lightrt offers:
//!
//! - **Forks**: child tasks with shared, awaitable results and exceptions
//! - **Stream bookkeeping**: every host descriptor is tracked and freed exactly once
//! - **Timer primitives** including sleep, sleep-until and timeout
//! - **An instance lifecycle** with CLI and server prologues, shutdown functions and
//!   finalization
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lightrt::platform::{InMemoryPlatform, PollStatus};
//! use lightrt::{Handle, ImageKind, InstanceBuilder};
//!
//! let platform = InMemoryPlatform::new();
//! platform.incoming(b"");
//!
//! let instance = InstanceBuilder::new(platform.clone())
//!     .image_kind(ImageKind::Cli)
//!     .script(|_| async {
//!         Handle::current().echo("hello");
//!         Ok(())
//!     })
//!     .build();
//!
//! assert_eq!(instance.poll(), PollStatus::FinishedOk);
//! ```
//!
//! ## Modules
//!
//! - [`platform`] — The host ABI and an in-memory host
//! - [`fork`] — Forks and their registry
//! - [`io`] — Stream reads and writes
//! - [`time`] — Timers, sleep and timeout
//! - [`error`] — Error types

mod instance;
mod runtime;
mod utils;

pub mod error;
pub mod fork;
pub mod io;
pub mod platform;
pub mod time;

pub use instance::{
    Frontend, ImageKind, Instance, InstanceKind, LifecycleState, NoopFrontend, RequestKind,
    StreamDisposition,
};
pub use runtime::builder::InstanceBuilder;
pub use runtime::core::Handle;
pub use runtime::scheduler::{
    ScheduleEvent, ScheduleStatus, Scheduler, WaitFor, WaitKey, WaitToken,
};
pub use runtime::task::JoinHandle;
pub use runtime::yield_now::yield_now;
