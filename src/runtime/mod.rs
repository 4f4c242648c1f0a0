//! Core runtime components.
//!
//! This module contains the fundamental building blocks of the runtime,
//! including task execution, scheduling, and cooperative yielding.
//!
//! It is responsible for:
//! - storing suspended tasks and resuming them when their wait is satisfied,
//! - mapping host events to the single task registered for them,
//! - providing the instance context to code running inside a task,
//! - enabling cooperative multitasking via yielding.

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod core;
pub(crate) mod scheduler;
pub(crate) mod task;
pub(crate) mod yield_now;
