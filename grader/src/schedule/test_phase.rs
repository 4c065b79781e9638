use std::sync::Mutex;
use std::thread;

use tracing::{debug, info, instrument};

use super::{STOPPED_MESSAGE, Scheduler};
use crate::capability::CompilerCapability;
use crate::core::round_robin::{RoundRobin, TaskIndex};
use crate::core::types::{TestCase, TestResult};

/// Completion counters passed to the per-task callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Tasks finished so far, including this one.
    pub completed: usize,
    /// Size of the full instance × case cross-product.
    pub total: usize,
}

/// One finished (or skipped) task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord<'a> {
    pub instance: String,
    pub case: &'a TestCase,
    pub result: TestResult,
}

struct Dispatch {
    task: TaskIndex,
    cancelled: bool,
}

/// Pull the next task and sample the cancel flag under one lock, so the set
/// of tasks that actually run is always a prefix of the round-robin order.
fn dispatch(source: &Mutex<RoundRobin>, scheduler: &Scheduler) -> Option<Dispatch> {
    let mut order = source.lock().ok()?;
    let task = order.next()?;
    Some(Dispatch {
        task,
        cancelled: scheduler.cancel.is_cancelled(),
    })
}

impl Scheduler {
    /// Run every (instance, case) pair once, in round-robin order.
    ///
    /// Case `i` starts at instance `i mod N`. Workers pull the next task only
    /// when they become free. A task dispatched after cancellation resolves
    /// to `Skipped` without invoking the capability, and that worker stops
    /// pulling. `on_result` runs on the calling thread in completion order;
    /// `completed` grows by one per call. Returns every record in completion
    /// order.
    #[instrument(
        skip_all,
        fields(instances = instances.len(), cases = cases.len(), max_workers = self.max_workers)
    )]
    pub fn run_tests<'a, C, F>(
        &self,
        instances: &[C],
        cases: &'a [TestCase],
        mut on_result: F,
    ) -> Vec<TaskRecord<'a>>
    where
        C: CompilerCapability,
        F: FnMut(&C, &TestCase, &TestResult, Progress),
    {
        let order = RoundRobin::new(instances.len(), cases.len());
        let total = order.total();
        let mut records = Vec::with_capacity(total);
        if total == 0 {
            return records;
        }
        let budget = self.max_workers;
        let workers = budget.min(total);
        let source = Mutex::new(order);
        let (tx, rx) = crossbeam_channel::unbounded::<(TaskIndex, TestResult)>();

        thread::scope(|scope| {
            for slot in 0..workers {
                let tx = tx.clone();
                let source = &source;
                scope.spawn(move || {
                    while let Some(Dispatch { task, cancelled }) = dispatch(source, self) {
                        if cancelled {
                            let _ = tx.send((task, TestResult::skipped(STOPPED_MESSAGE)));
                            break;
                        }
                        let instance = &instances[task.instance];
                        let case = &cases[task.case];
                        let worker_id = instance.allocate_worker_id(budget);
                        debug!(
                            slot,
                            worker_id,
                            instance = instance.instance_name(),
                            case = %case.name,
                            "task started"
                        );
                        let result = instance.test(
                            &case.source,
                            case.input.as_deref(),
                            case.expected_output.as_deref(),
                            worker_id,
                        );
                        instance.release_worker_id(worker_id);
                        if tx.send((task, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            let mut completed = 0;
            for (task, result) in rx {
                completed += 1;
                let instance = &instances[task.instance];
                let case = &cases[task.case];
                debug!(
                    instance = instance.instance_name(),
                    case = %case.name,
                    status = %result.status,
                    completed,
                    total,
                    "task finished"
                );
                on_result(instance, case, &result, Progress { completed, total });
                records.push(TaskRecord {
                    instance: instance.instance_name().to_string(),
                    case,
                    result,
                });
            }
        });

        info!(
            completed = records.len(),
            total,
            cancelled = self.cancel.is_cancelled(),
            "test phase finished"
        );
        records
    }
}
