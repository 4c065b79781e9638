//! Worker id allocation for capability implementations.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

/// Lends worker ids in `0..budget`, always the lowest id not currently held.
///
/// Embed one per compiler instance. An id stays taken until
/// [`release`](Self::release) is called for it, so tests that overlap on the
/// same instance never share a scratch slot while both are running.
#[derive(Debug, Default)]
pub struct WorkerSlots {
    held: Mutex<BTreeSet<usize>>,
}

impl WorkerSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lowest free id in `0..budget`. A zero budget is treated as one.
    ///
    /// When every id is already held (more concurrent callers than the
    /// budget), the id with the lowest value is shared.
    pub fn allocate(&self, budget: usize) -> usize {
        let budget = budget.max(1);
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        match (0..budget).find(|id| !held.contains(id)) {
            Some(id) => {
                held.insert(id);
                id
            }
            None => 0,
        }
    }

    /// Return `id` to the pool. Releasing a free id is a no-op.
    pub fn release(&self, id: usize) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Ids currently lent out.
    pub fn in_use(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lends_lowest_free_id() {
        let slots = WorkerSlots::new();
        assert_eq!(slots.allocate(3), 0);
        assert_eq!(slots.allocate(3), 1);
        slots.release(0);
        assert_eq!(slots.allocate(3), 0);
        assert_eq!(slots.allocate(3), 2);
        assert_eq!(slots.in_use(), 3);
    }

    #[test]
    fn held_id_is_never_lent_twice() {
        let slots = WorkerSlots::new();
        let slow = slots.allocate(2);
        for _ in 0..5 {
            let quick = slots.allocate(2);
            assert_ne!(quick, slow);
            slots.release(quick);
        }
        slots.release(slow);
        assert_eq!(slots.in_use(), 0);
    }

    #[test]
    fn zero_budget_behaves_as_one() {
        let slots = WorkerSlots::new();
        assert_eq!(slots.allocate(0), 0);
        slots.release(0);
        assert_eq!(slots.allocate(0), 0);
    }
}
