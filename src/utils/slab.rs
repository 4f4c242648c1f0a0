/// A simple slab allocator.
///
/// A `Slab` stores values of type `T` in a contiguous array and returns
/// stable indices that can be reused after removal.
///
/// Internally, it keeps track of:
/// - occupied slots,
/// - free indices,
/// - the number of live values.
///
/// The scheduler keys its task table by these indices, so a slot index is
/// only meaningful together with the value stored in it: once removed, the
/// index may be handed out again.
pub(crate) struct Slab<T> {
    /// Storage for items; `None` marks a free slot.
    items: Vec<Option<T>>,
    /// Stack of free indices that can be reused.
    free: Vec<usize>,
    /// Number of occupied slots.
    len: usize,
}

impl<T> Slab<T> {
    /// Creates a new `Slab` with a fixed initial capacity.
    ///
    /// All slots are initially free.
    ///
    /// # Arguments
    ///
    /// * `size` - Initial number of slots to allocate.
    pub(crate) fn new(size: usize) -> Self {
        let items = (0..size).map(|_| None).collect();
        // Reversed so that the lowest index is handed out first.
        let free = (0..size).rev().collect();

        Self {
            items,
            free,
            len: 0,
        }
    }

    /// Inserts a value into the slab and returns its index.
    ///
    /// If a free slot is available, it is reused.
    /// Otherwise, the slab grows exponentially.
    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = if let Some(i) = self.free.pop() {
            i
        } else {
            let len = self.items.len();
            let new_len = if len == 0 { 1 } else { 2 * len };

            self.items.extend((len..new_len).map(|_| None));
            self.free.extend(((len + 1)..new_len).rev());

            len
        };

        self.items[index] = Some(item);
        self.len += 1;

        index
    }

    /// Removes and returns the value stored at `index`.
    ///
    /// The slot becomes free and may be reused by future insertions.
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - `index` is out of bounds
    /// - the slot is not currently in use
    pub(crate) fn remove(&mut self, index: usize) -> T {
        assert!(index < self.items.len(), "Index out of range");

        let item = self.items[index].take().expect("Item is not set");
        self.free.push(index);
        self.len -= 1;

        item
    }

    /// Returns the index the next call to [`insert`](Self::insert) will use.
    pub(crate) fn next_index(&self) -> usize {
        self.free.last().copied().unwrap_or(self.items.len())
    }

    /// Returns a mutable reference to the value at `index`, if occupied.
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index).and_then(Option::as_mut)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, index: usize) -> bool {
        matches!(self.items.get(index), Some(Some(_)))
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every value, returning them in index order.
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let drained: Vec<T> = self.items.iter_mut().filter_map(Option::take).collect();

        self.free = (0..self.items.len()).rev().collect();
        self.len = 0;

        drained
    }
}

#[cfg(test)]
mod tests {
    use super::Slab;

    #[test]
    fn test_insert_reuses_removed_slots() {
        let mut slab = Slab::new(2);

        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_eq!((a, b), (0, 1));

        assert_eq!(slab.remove(a), "a");
        assert!(!slab.contains(a));

        assert_eq!(slab.next_index(), a);
        let c = slab.insert("c");
        assert_eq!(c, a);
        assert_eq!(slab.len(), 2);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut slab = Slab::new(0);

        for i in 0..5 {
            assert_eq!(slab.next_index(), i);
            assert_eq!(slab.insert(i), i);
        }

        assert_eq!(slab.len(), 5);
        assert_eq!(slab.get_mut(4), Some(&mut 4));
        assert_eq!(slab.get_mut(7), None);
    }

    #[test]
    fn test_drain_empties_the_slab() {
        let mut slab = Slab::new(4);
        slab.insert(1);
        let middle = slab.insert(2);
        slab.insert(3);
        slab.remove(middle);

        assert_eq!(slab.drain(), vec![1, 3]);
        assert!(slab.is_empty());
        assert_eq!(slab.insert(9), 0);
    }

    #[test]
    #[should_panic(expected = "Item is not set")]
    fn test_remove_twice_panics() {
        let mut slab = Slab::new(1);
        let index = slab.insert(());
        slab.remove(index);
        slab.remove(index);
    }
}
