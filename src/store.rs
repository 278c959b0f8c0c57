//! Thread-safe double-ended item storage

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Double-ended queue guarded by a single lock.
///
/// Every operation takes the lock once, so pushes and pops are never observed
/// half-done. The lock is never held across user callbacks.
pub(crate) struct ItemStore<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> ItemStore<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_back(&self, item: T) {
        self.items.lock().push_back(item);
    }

    pub fn push_front(&self, item: T) {
        self.items.lock().push_front(item);
    }

    pub fn pop_front(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Empty the store, dropping every item. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        // Swap out under the lock, drop outside it.
        let drained = std::mem::take(&mut *self.items.lock());
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl<T> Default for ItemStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_with_front_reinsert() {
        let store = ItemStore::new();
        store.push_back(1);
        store.push_back(2);
        store.push_back(3);

        let first = store.pop_front().unwrap();
        assert_eq!(first, 1);
        store.push_front(first);

        assert_eq!(store.pop_front(), Some(1));
        assert_eq!(store.pop_front(), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_all() {
        let store = ItemStore::new();
        for i in 0..5 {
            store.push_back(i);
        }

        assert_eq!(store.remove_all(), 5);
        assert!(store.is_empty());
        assert_eq!(store.pop_front(), None);
    }

    #[test]
    fn test_concurrent_push_pop_loses_nothing() {
        let store = Arc::new(ItemStore::new());
        let mut handles = Vec::new();

        for t in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..1_000 {
                    store.push_back(t * 1_000 + i);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 4_000);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let mut popped = 0;
                while store.pop_front().is_some() {
                    popped += 1;
                }
                popped
            }));
        }
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 4_000);
        assert!(store.is_empty());
    }
}
