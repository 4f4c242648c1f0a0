use crate::error::HostError;
use crate::platform::TimePoint;
use crate::runtime::core::Handle;
use crate::runtime::scheduler::{WaitFor, WaitKey};
use crate::time::timer::TimerHandle;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

/// Creates a future that completes after the given duration.
///
/// The host timer is created on the first poll; the duration counts from
/// there.
///
/// # Panics
///
/// Panics if polled outside of an instance.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await?;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(None, Deadline::After(duration))
}

/// Creates a future that completes once the host clock reaches `deadline`.
///
/// # Panics
///
/// Panics if polled outside of an instance.
pub fn sleep_until(deadline: TimePoint) -> Sleep {
    Sleep::new(None, Deadline::At(deadline))
}

#[derive(Debug, Clone, Copy)]
enum Deadline {
    After(Duration),
    At(TimePoint),
}

/// A future that completes once its host timer fires.
///
/// Resolves to an error if the host refuses to create the timer. Dropping
/// the future releases the timer.
pub struct Sleep {
    handle: Option<Handle>,
    deadline: Deadline,

    /// Dropped before the timer, so the registration goes first.
    wait: Option<WaitFor>,
    timer: Option<TimerHandle>,
}

impl Sleep {
    fn new(handle: Option<Handle>, deadline: Deadline) -> Self {
        Self {
            handle,
            deadline,
            wait: None,
            timer: None,
        }
    }

    /// Creates the host timer and the wait registration for it.
    fn arm(&mut self) -> Result<(), HostError> {
        let handle = self.handle.get_or_insert_with(Handle::current).clone();

        let deadline = match self.deadline {
            Deadline::After(duration) => handle.platform().instant().after(duration),
            Deadline::At(deadline) => deadline,
        };

        let mut timer = TimerHandle::new(handle.clone());
        timer.reset(deadline)?;

        if let Some(descriptor) = timer.descriptor() {
            self.wait = Some(WaitFor::new(handle, WaitKey::Timer(descriptor)));
        }
        self.timer = Some(timer);

        Ok(())
    }
}

impl Future for Sleep {
    type Output = Result<(), HostError>;

    /// Polls the sleep future.
    ///
    /// On the first poll, the timer is created and the task registered on
    /// it. The task is resumed once the host reports the timer fired.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.timer.is_none() {
            if let Err(error) = this.arm() {
                return Poll::Ready(Err(error));
            }
        }

        if let Some(wait) = this.wait.as_mut() {
            if Pin::new(wait).poll(cx).is_pending() {
                return Poll::Pending;
            }
        }

        this.wait = None;
        if let Some(timer) = this.timer.as_mut() {
            timer.clear();
        }

        Poll::Ready(Ok(()))
    }
}

impl Handle {
    /// Same as [`sleep`], bound to this instance.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(Some(self.clone()), Deadline::After(duration))
    }

    /// Same as [`sleep_until`], bound to this instance.
    pub fn sleep_until(&self, deadline: TimePoint) -> Sleep {
        Sleep::new(Some(self.clone()), Deadline::At(deadline))
    }
}
