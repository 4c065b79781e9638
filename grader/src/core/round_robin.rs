//! Round-robin ordering of the instance × case cross-product.
//!
//! Case `i` starts at instance `i mod N` and then visits every instance once,
//! wrapping. Cutting the sequence at any point leaves per-instance task
//! counts within one of each other, so no instance starves when a run is
//! cancelled early.

/// One task in the cross-product, as indices into the instance and case lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskIndex {
    pub instance: usize,
    pub case: usize,
}

/// Lazy iterator over the round-robin task order.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    instances: usize,
    cases: usize,
    next: usize,
}

impl RoundRobin {
    pub fn new(instances: usize, cases: usize) -> Self {
        Self {
            instances,
            cases,
            next: 0,
        }
    }

    /// Total number of tasks in the cross-product.
    pub fn total(&self) -> usize {
        self.instances * self.cases
    }
}

impl Iterator for RoundRobin {
    type Item = TaskIndex;

    fn next(&mut self) -> Option<TaskIndex> {
        if self.next >= self.total() {
            return None;
        }
        let case = self.next / self.instances;
        let offset = self.next % self.instances;
        self.next += 1;
        Some(TaskIndex {
            instance: (case + offset) % self.instances,
            case,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RoundRobin {}
