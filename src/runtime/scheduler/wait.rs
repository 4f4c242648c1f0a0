use crate::error::invariant_violation;
use crate::platform::Descriptor;
use crate::runtime::core::Handle;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// What a suspended task is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitKey {
    /// The host delivered an update on this stream.
    Stream(Descriptor),

    /// This timer fired.
    Timer(Descriptor),

    /// The host opened a new stream towards the instance.
    IncomingStream,

    /// No particular event: the task only wants another turn.
    Reschedule,
}

impl WaitKey {
    /// Exclusive keys accept a single waiter at a time.
    fn is_exclusive(self) -> bool {
        matches!(self, WaitKey::Stream(_) | WaitKey::Timer(_))
    }
}

/// Identifies one registration under a wait key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitToken(u64);

struct Waiter {
    token: WaitToken,
    waker: Waker,
}

/// Registrations of suspended tasks, by wait key.
///
/// Stream and timer keys are exclusive: the host protocol has no fan-out,
/// so a second registration on an occupied key is a broken invariant.
/// Incoming-stream and reschedule keys queue their waiters and release
/// them one per event, oldest first.
#[derive(Default)]
pub(crate) struct WaitTable {
    last_token: u64,
    exclusive: HashMap<WaitKey, Waiter>,
    incoming: VecDeque<Waiter>,
    rescheduled: VecDeque<Waiter>,
}

impl WaitTable {
    fn queue_mut(&mut self, key: WaitKey) -> &mut VecDeque<Waiter> {
        match key {
            WaitKey::IncomingStream => &mut self.incoming,
            _ => &mut self.rescheduled,
        }
    }

    /// Registers a waiter under `key`.
    pub(crate) fn register(&mut self, key: WaitKey, waker: &Waker) -> WaitToken {
        self.last_token += 1;
        let waiter = Waiter {
            token: WaitToken(self.last_token),
            waker: waker.clone(),
        };
        let token = waiter.token;

        if key.is_exclusive() {
            if self.exclusive.contains_key(&key) {
                invariant_violation(format!("a task is already suspended on {key:?}"));
            }
            self.exclusive.insert(key, waiter);
        } else {
            self.queue_mut(key).push_back(waiter);
        }

        token
    }

    /// Refreshes the waker of a live registration.
    ///
    /// Returns `false` once the registration was released by an event.
    pub(crate) fn refresh(&mut self, key: WaitKey, token: WaitToken, waker: &Waker) -> bool {
        let waiter = if key.is_exclusive() {
            self.exclusive.get_mut(&key).filter(|w| w.token == token)
        } else {
            self.queue_mut(key).iter_mut().find(|w| w.token == token)
        };

        match waiter {
            Some(waiter) => {
                if !waiter.waker.will_wake(waker) {
                    waiter.waker = waker.clone();
                }
                true
            }
            None => false,
        }
    }

    /// Drops a registration that is no longer wanted.
    pub(crate) fn cancel(&mut self, key: WaitKey, token: WaitToken) {
        if key.is_exclusive() {
            if self.exclusive.get(&key).is_some_and(|w| w.token == token) {
                self.exclusive.remove(&key);
            }
        } else {
            self.queue_mut(key).retain(|w| w.token != token);
        }
    }

    /// Releases the waiter an event on `key` is meant for.
    pub(crate) fn take(&mut self, key: WaitKey) -> Option<Waker> {
        let waiter = if key.is_exclusive() {
            self.exclusive.remove(&key)
        } else {
            self.queue_mut(key).pop_front()
        };

        waiter.map(|w| w.waker)
    }

    /// Drops every registration tied to `descriptor`.
    ///
    /// Returns `true` if a task was waiting on it.
    pub(crate) fn forget(&mut self, descriptor: Descriptor) -> bool {
        let stream = self.exclusive.remove(&WaitKey::Stream(descriptor));
        let timer = self.exclusive.remove(&WaitKey::Timer(descriptor));
        stream.is_some() || timer.is_some()
    }

    pub(crate) fn is_waiting(&self, key: WaitKey) -> bool {
        if key.is_exclusive() {
            self.exclusive.contains_key(&key)
        } else {
            match key {
                WaitKey::IncomingStream => !self.incoming.is_empty(),
                _ => !self.rescheduled.is_empty(),
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.exclusive.len() + self.incoming.len() + self.rescheduled.len()
    }

    pub(crate) fn clear(&mut self) {
        self.exclusive.clear();
        self.incoming.clear();
        self.rescheduled.clear();
    }
}

enum WaitState {
    Idle,
    Waiting(WaitToken),
    Done,
}

/// A future that completes once the scheduler releases a wait key.
///
/// The first poll registers the current task under the key; the future
/// resolves on the first poll after the matching event vacated the
/// registration. Dropping the future before that deregisters it.
///
/// # Examples
///
/// ```rust,ignore
/// // Suspend until the host reports an update on `stream`.
/// WaitFor::new(handle.clone(), WaitKey::Stream(stream)).await;
/// ```
pub struct WaitFor {
    handle: Handle,
    key: WaitKey,
    state: WaitState,
}

impl WaitFor {
    pub fn new(handle: Handle, key: WaitKey) -> Self {
        Self {
            handle,
            key,
            state: WaitState::Idle,
        }
    }

    pub fn key(&self) -> WaitKey {
        self.key
    }
}

impl Future for WaitFor {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        let scheduler = this.handle.scheduler();

        match this.state {
            WaitState::Idle => {
                let token = scheduler.suspend(this.key, cx.waker());
                this.state = WaitState::Waiting(token);
                Poll::Pending
            }
            WaitState::Waiting(token) => {
                if scheduler.refresh(this.key, token, cx.waker()) {
                    Poll::Pending
                } else {
                    this.state = WaitState::Done;
                    Poll::Ready(())
                }
            }
            WaitState::Done => Poll::Ready(()),
        }
    }
}

impl Drop for WaitFor {
    fn drop(&mut self) {
        if let WaitState::Waiting(token) = self.state {
            self.handle.scheduler().cancel(self.key, token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WaitKey, WaitTable};
    use crate::platform::Descriptor;

    use std::task::Waker;

    fn descriptor(raw: u64) -> Descriptor {
        Descriptor::new(raw).unwrap()
    }

    #[test]
    fn test_exclusive_key_is_released_once() {
        let mut table = WaitTable::default();
        let key = WaitKey::Stream(descriptor(3));

        let token = table.register(key, Waker::noop());
        assert!(table.refresh(key, token, Waker::noop()));

        assert!(table.take(key).is_some());
        assert!(table.take(key).is_none());
        assert!(!table.refresh(key, token, Waker::noop()));
    }

    #[test]
    fn test_queued_keys_release_oldest_first() {
        let mut table = WaitTable::default();

        let first = table.register(WaitKey::IncomingStream, Waker::noop());
        let second = table.register(WaitKey::IncomingStream, Waker::noop());
        assert_eq!(table.len(), 2);

        table.take(WaitKey::IncomingStream);
        assert!(!table.refresh(WaitKey::IncomingStream, first, Waker::noop()));
        assert!(table.refresh(WaitKey::IncomingStream, second, Waker::noop()));
    }

    #[test]
    fn test_cancel_ignores_foreign_tokens() {
        let mut table = WaitTable::default();
        let key = WaitKey::Timer(descriptor(9));

        let stale = table.register(key, Waker::noop());
        table.take(key);
        let current = table.register(key, Waker::noop());

        table.cancel(key, stale);
        assert!(table.is_waiting(key));

        table.cancel(key, current);
        assert!(!table.is_waiting(key));
    }

    #[test]
    fn test_forget_drops_descriptor_waits() {
        let mut table = WaitTable::default();
        table.register(WaitKey::Stream(descriptor(1)), Waker::noop());
        table.register(WaitKey::Reschedule, Waker::noop());

        assert!(table.forget(descriptor(1)));
        assert!(!table.forget(descriptor(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    #[should_panic]
    fn test_double_suspend_on_exclusive_key_panics() {
        let mut table = WaitTable::default();
        let key = WaitKey::Stream(descriptor(4));

        table.register(key, Waker::noop());
        table.register(key, Waker::noop());
    }
}
