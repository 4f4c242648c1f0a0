use crate::runtime::core::Handle;

use std::cell::RefCell;

thread_local! {
    /// Handle of the instance whose code is currently executing.
    ///
    /// Installed for the duration of every poll of the instance, so code
    /// running inside a task can reach the runtime without a handle being
    /// passed through every call.
    pub(crate) static CURRENT_INSTANCE: RefCell<Option<Handle>> = const { RefCell::new(None) };
}

/// Restores the previously installed instance when dropped, including
/// when a task unwinds out of the context.
struct Restore(Option<Handle>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT_INSTANCE.with(|current| *current.borrow_mut() = previous);
    }
}

/// Runs `f` with `handle` installed as the current instance.
///
/// Contexts nest: the instance that was current before is restored once
/// `f` returns.
pub(crate) fn enter_context<R>(handle: Handle, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_INSTANCE.with(|current| current.replace(Some(handle)));
    let _restore = Restore(previous);

    f()
}

/// Returns the current instance, if code is running inside one.
pub(crate) fn try_current() -> Option<Handle> {
    CURRENT_INSTANCE.with(|current| current.borrow().clone())
}
