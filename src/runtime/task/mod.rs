//! Asynchronous task primitives.
//!
//! This module defines the core abstractions used by the scheduler to
//! represent, wake, and complete tasks.
//!
//! It includes:
//! - task state management,
//! - custom waker integration,
//! - join handles for awaiting a single-owner task,
//! - the task table entries stored by the scheduler.

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod state;
pub(crate) mod waker;

pub(crate) use self::core::{LocalFuture, TaskHeader, TaskSlot};

pub use handle::JoinHandle;
