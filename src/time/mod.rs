//! Timers on top of the host clock.
//!
//! This module provides time-related asynchronous utilities that
//! integrate with the host timer descriptors.
//!
//! It includes:
//! - [`TimerHandle`] owning a single host timer,
//! - [`sleep`] and [`sleep_until`] for suspending a task,
//! - [`timeout`] for bounding future execution time.

mod sleep;
mod timeout;
mod timer;

#[doc(inline)]
pub use sleep::{Sleep, sleep, sleep_until};

#[doc(inline)]
pub use timeout::{Timeout, TimeoutError, timeout};

#[doc(inline)]
pub use timer::TimerHandle;
