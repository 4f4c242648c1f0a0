use super::core::TaskHeader;

use std::mem;
use std::sync::Arc;
use std::task::{RawWaker, RawWakerVTable, Waker};

/// The vtable defines how the scheduler interacts with a task when:
/// - cloning the waker,
/// - waking the task,
/// - waking by reference,
/// - dropping the waker.
///
/// # Safety
///
/// All functions in the vtable must uphold the invariants required
/// by [`RawWaker`]: the data pointer always originates from
/// `Arc::<TaskHeader>::into_raw` and every function keeps the reference
/// count balanced.
static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw);

/// Creates a [`Waker`] associated with a task header.
///
/// The returned waker pushes the task back onto the ready queue when woken.
pub(crate) fn make_waker(header: Arc<TaskHeader>) -> Waker {
    unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(header) as *const (), &VTABLE)) }
}

/// Returns the task a waker belongs to, if it is a task waker.
///
/// Lets the scheduler resume the exact task an event is meant for instead
/// of whichever task is first in the ready queue.
pub(crate) fn task_of(waker: &Waker) -> Option<Arc<TaskHeader>> {
    if !std::ptr::eq(waker.vtable(), &VTABLE) {
        return None;
    }

    let ptr = waker.data() as *const TaskHeader;
    // The waker keeps its own reference; this one is new.
    unsafe {
        Arc::increment_strong_count(ptr);
        Some(Arc::from_raw(ptr))
    }
}

/// Clones the raw waker.
///
/// This increments the reference count of the underlying header.
fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::<TaskHeader>::from_raw(ptr as *const TaskHeader) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
}

/// Wakes the task and consumes the waker.
fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskHeader>::from_raw(ptr as *const TaskHeader) };
    arc.wake();
}

/// Wakes the task without consuming the waker.
fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskHeader>::from_raw(ptr as *const TaskHeader) };
    arc.wake();
    mem::forget(arc);
}

/// Drops the raw waker, decrementing the header's reference count.
fn drop_raw(ptr: *const ()) {
    unsafe { drop(Arc::<TaskHeader>::from_raw(ptr as *const TaskHeader)) };
}
