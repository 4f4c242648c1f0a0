use crate::error::HostError;
use crate::platform::{Descriptor, TimePoint};
use crate::runtime::core::Handle;
use crate::runtime::scheduler::{WaitFor, WaitKey};

/// Owner of at most one host timer.
///
/// The timer descriptor belongs to the instance like any stream; the handle
/// releases it when cleared, re-armed or dropped.
///
/// # Examples
///
/// ```rust,ignore
/// let mut timer = TimerHandle::new(handle.clone());
/// timer.reset(handle.platform().instant().after(Duration::from_millis(5)))?;
/// timer.fired().await;
/// ```
#[derive(Debug)]
pub struct TimerHandle {
    handle: Handle,
    descriptor: Option<Descriptor>,
    deadline: Option<TimePoint>,
}

impl TimerHandle {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            descriptor: None,
            deadline: None,
        }
    }

    /// Arms the timer for `deadline`, dropping any previous one.
    ///
    /// A deadline that is not in the future is moved one nanosecond past
    /// the current host time, so the timer always fires through the host.
    pub fn reset(&mut self, deadline: TimePoint) -> Result<(), HostError> {
        self.clear();

        let now = self.handle.platform().instant();
        let deadline = if deadline <= now { TimePoint(now.0 + 1) } else { deadline };

        let descriptor = self.handle.set_timer(deadline.since(now))?;
        self.descriptor = Some(descriptor);
        self.deadline = Some(deadline);

        Ok(())
    }

    /// Disarms the timer and releases its descriptor. Idempotent.
    ///
    /// A task still waiting on the timer is not woken.
    pub fn clear(&mut self) {
        if let Some(descriptor) = self.descriptor.take() {
            // The instance may already have released it while shutting down.
            if self.handle.is_open(descriptor) {
                self.handle.release_stream(descriptor);
            }
        }
        self.deadline = None;
    }

    pub fn descriptor(&self) -> Option<Descriptor> {
        self.descriptor
    }

    pub fn deadline(&self) -> Option<TimePoint> {
        self.deadline
    }

    pub fn is_set(&self) -> bool {
        self.descriptor.is_some()
    }

    /// Waits for the timer to fire.
    ///
    /// # Panics
    ///
    /// Panics if the timer is not set.
    pub async fn fired(&self) {
        let Some(descriptor) = self.descriptor else {
            panic!("waiting on a timer that is not set");
        };

        WaitFor::new(self.handle.clone(), WaitKey::Timer(descriptor)).await
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.clear();
    }
}
