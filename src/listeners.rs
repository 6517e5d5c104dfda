//! Copy-on-write subscriber lists.
//!
//! Dispatch iterates over a snapshot of the list, so a callback may
//! subscribe or unsubscribe (itself included) without deadlocking or
//! invalidating the iteration in progress.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub struct Listeners<F: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Arc<Vec<(ListenerId, Arc<F>)>>>,
}

impl<F: ?Sized> Listeners<F> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Arc::new(Vec::new())),
        }
    }

    pub fn add(&self, listener: Arc<F>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.lock();
        let mut next = Vec::clone(&entries);
        next.push((id, listener));
        *entries = Arc::new(next);
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        if !entries.iter().any(|(existing, _)| *existing == id) {
            return false;
        }
        let next = entries
            .iter()
            .filter(|(existing, _)| *existing != id)
            .cloned()
            .collect();
        *entries = Arc::new(next);
        true
    }

    pub fn clear(&self) {
        *self.entries.lock() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Listeners registered at the time of the call, in registration order.
    pub fn snapshot(&self) -> Arc<Vec<(ListenerId, Arc<F>)>> {
        Arc::clone(&self.entries.lock())
    }

    pub fn for_each(&self, mut f: impl FnMut(&F)) {
        for (_, listener) in self.snapshot().iter() {
            f(listener);
        }
    }
}

impl<F: ?Sized> Default for Listeners<F> {
    fn default() -> Self {
        Self::new()
    }
}
