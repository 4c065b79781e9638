//! Two-phase scheduling: bounded-parallel compile, then round-robin tests.
//!
//! Both phases run on a scoped pool of at most `max_workers` threads that pull
//! work from a shared source. Results travel back over a channel and the
//! caller's callback runs on the calling thread, in completion order.
//! Cancellation is cooperative: the shared flag is checked before each job
//! starts, and started jobs always finish.

mod compile_phase;
mod pipeline;
mod test_phase;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub use compile_phase::compiled_subset;
pub use pipeline::{InstanceReport, InstanceStage, PipelineEvent, PipelineReport};
pub use test_phase::{Progress, TaskRecord};

/// Shared, clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Message attached to jobs skipped because of cancellation.
pub const STOPPED_MESSAGE: &str = "stopped";

/// Worker budget plus cancellation flag shared by both phases.
#[derive(Debug, Clone)]
pub struct Scheduler {
    max_workers: usize,
    cancel: CancelFlag,
}

impl Scheduler {
    /// A zero budget is treated as one worker.
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let scheduler = Scheduler::new(0).with_cancel(flag.clone());
        assert_eq!(scheduler.max_workers(), 1);
        assert!(!scheduler.cancel_flag().is_cancelled());
        flag.cancel();
        assert!(scheduler.cancel_flag().is_cancelled());
    }
}
