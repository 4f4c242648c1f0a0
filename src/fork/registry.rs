use crate::error::Exception;

use std::any::Any;
use std::collections::HashMap;
use std::rc::Weak;

/// Identifier of a fork, unique within an instance.
pub type ForkId = i64;

/// Exception class recorded for a fork dropped before it finished.
pub(crate) const CANCELLED: &str = "ForkCancelled";

/// A snapshot of a fork's registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkInfo {
    pub id: ForkId,

    /// The fork body has finished, or was dropped before finishing.
    pub completed: bool,

    /// Somebody observed the fork's outcome.
    pub awaited: bool,

    /// The exception the fork body returned, if any.
    pub exception: Option<Exception>,
}

struct ForkEntry {
    info: ForkInfo,

    /// The fork's result cell, type-erased; kept for diagnostics only.
    cell: Weak<dyn Any>,
}

/// Bookkeeping for every fork of an instance that is still reachable.
///
/// An entry lives until its fork has completed and the last owner of its
/// result (the fork task or a [`ForkHandle`](super::ForkHandle)) is gone.
#[derive(Default)]
pub(crate) struct ForkRegistry {
    next_id: ForkId,
    forks: HashMap<ForkId, ForkEntry>,

    /// The fork whose body is being polled right now.
    current: Option<ForkId>,
}

impl ForkRegistry {
    pub(crate) fn register(&mut self, cell: Weak<dyn Any>) -> ForkId {
        let id = self.next_id;
        self.next_id += 1;

        let info = ForkInfo {
            id,
            completed: false,
            awaited: false,
            exception: None,
        };
        self.forks.insert(id, ForkEntry { info, cell });

        id
    }

    pub(crate) fn get(&self, id: ForkId) -> Option<&ForkInfo> {
        self.forks.get(&id).map(|entry| &entry.info)
    }

    pub(crate) fn current(&self) -> Option<ForkId> {
        self.current
    }

    /// Installs `current` as the running fork, returning the previous one.
    pub(crate) fn set_current(&mut self, current: Option<ForkId>) -> Option<ForkId> {
        std::mem::replace(&mut self.current, current)
    }

    pub(crate) fn complete(&mut self, id: ForkId, exception: Option<Exception>) {
        if let Some(entry) = self.forks.get_mut(&id) {
            entry.info.completed = true;
            entry.info.exception = exception;
        }
    }

    pub(crate) fn mark_awaited(&mut self, id: ForkId) {
        if let Some(entry) = self.forks.get_mut(&id) {
            entry.info.awaited = true;
        }
    }

    /// Called by the last owner of a fork's result before it lets go.
    ///
    /// A completed fork is forgotten; an exception nobody looked at is
    /// reported on the way out.
    pub(crate) fn release(&mut self, id: ForkId) {
        let completed = self.forks.get(&id).is_some_and(|entry| entry.info.completed);
        if !completed {
            return;
        }

        if let Some(entry) = self.forks.remove(&id) {
            match (&entry.info.exception, entry.info.awaited) {
                (Some(exception), false) if exception.class == CANCELLED => {
                    tracing::debug!(fork = id, "cancelled fork reaped");
                }
                (Some(exception), false) => {
                    tracing::error!(fork = id, %exception, "unhandled exception in fork");
                }
                _ => {}
            }
            tracing::trace!(fork = id, owners = entry.cell.strong_count(), "fork reaped");
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.forks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::ForkRegistry;
    use crate::error::Exception;

    use std::any::Any;
    use std::rc::{Rc, Weak};

    fn cell() -> (Rc<()>, Weak<dyn Any>) {
        let cell = Rc::new(());
        let weak: Weak<dyn Any> = Rc::downgrade(&cell) as Weak<dyn Any>;
        (cell, weak)
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut registry = ForkRegistry::default();
        let ids: Vec<_> = (0..4).map(|_| registry.register(cell().1)).collect();

        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_release_keeps_running_forks() {
        let mut registry = ForkRegistry::default();
        let (_owner, weak) = cell();
        let id = registry.register(weak);

        registry.release(id);
        assert!(registry.get(id).is_some());

        registry.complete(id, Some(Exception::new("Exception", "boom")));
        registry.release(id);
        assert!(registry.get(id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_current_is_restored() {
        let mut registry = ForkRegistry::default();

        let previous = registry.set_current(Some(3));
        assert_eq!(previous, None);
        assert_eq!(registry.current(), Some(3));

        registry.set_current(previous);
        assert_eq!(registry.current(), None);
    }
}
