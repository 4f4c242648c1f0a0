use crate::runtime::core::Handle;
use crate::runtime::scheduler::{WaitFor, WaitKey};

/// Yields execution back to the host exactly once.
///
/// The task parks until it is handed a turn: either the host asks the
/// instance to yield, or the scheduler runs out of other runnable tasks.
///
/// # Panics
///
/// Panics if called outside of an instance.
///
/// # Examples
///
/// ```rust,ignore
/// async fn task() {
///     // Allow other tasks and the host to make progress
///     yield_now().await;
/// }
/// ```
pub async fn yield_now() {
    WaitFor::new(Handle::current(), WaitKey::Reschedule).await
}

impl Handle {
    /// Same as [`yield_now`], for code that already holds a handle.
    pub async fn yield_now(&self) {
        WaitFor::new(self.clone(), WaitKey::Reschedule).await
    }
}
