use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use tracing::{debug, info, instrument, warn};

use super::{STOPPED_MESSAGE, Scheduler};
use crate::capability::CompilerCapability;
use crate::core::types::CompileOutcome;

impl Scheduler {
    /// Compile every instance at most once with at most
    /// `min(max_workers, instances.len())` compiles in flight.
    ///
    /// Jobs that have not started when cancellation is observed resolve to a
    /// failed "stopped" outcome without invoking the capability. One
    /// instance's failure never affects another's. `on_compiled` runs on the
    /// calling thread once per instance, in completion order.
    #[instrument(skip_all, fields(instances = instances.len(), max_workers = self.max_workers))]
    pub fn compile_all<C, F>(
        &self,
        instances: &[C],
        mut on_compiled: F,
    ) -> BTreeMap<String, CompileOutcome>
    where
        C: CompilerCapability,
        F: FnMut(&C, &CompileOutcome),
    {
        let mut results = BTreeMap::new();
        if instances.is_empty() {
            return results;
        }
        let workers = self.max_workers.min(instances.len());
        let cursor = AtomicUsize::new(0);
        let (tx, rx) = crossbeam_channel::unbounded::<(usize, CompileOutcome)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                scope.spawn(move || {
                    loop {
                        let index = cursor.fetch_add(1, Ordering::SeqCst);
                        let Some(instance) = instances.get(index) else {
                            break;
                        };
                        let outcome = if self.cancel.is_cancelled() {
                            CompileOutcome::failure(STOPPED_MESSAGE)
                        } else {
                            debug!(instance = instance.instance_name(), "compile started");
                            instance.compile()
                        };
                        if tx.send((index, outcome)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(tx);

            for (index, outcome) in rx {
                let instance = &instances[index];
                let name = instance.instance_name().to_string();
                if outcome.success {
                    info!(instance = %name, "compile succeeded");
                } else {
                    warn!(instance = %name, message = %outcome.message, "compile failed");
                }
                on_compiled(instance, &outcome);
                if results.insert(name.clone(), outcome).is_some() {
                    warn!(instance = %name, "duplicate instance name; earlier outcome replaced");
                }
            }
        });

        results
    }
}

/// Instances whose compile succeeded, in their original order.
pub fn compiled_subset<'a, C: CompilerCapability>(
    instances: &'a [C],
    results: &BTreeMap<String, CompileOutcome>,
) -> Vec<&'a C> {
    instances
        .iter()
        .filter(|instance| {
            results
                .get(instance.instance_name())
                .is_some_and(|outcome| outcome.success)
        })
        .collect()
}
