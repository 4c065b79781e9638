//! The compile/test capability consumed by the schedulers.
//!
//! How a build is invoked and how outputs are compared belong to the
//! implementation. Every method blocks, and internal failures (crashes,
//! timeouts, missing tools) must come back as a negative result, never as a
//! panic.

use std::path::Path;
use std::sync::Arc;

use crate::core::types::{CompileOutcome, TestResult};

pub trait CompilerCapability: Send + Sync {
    /// Unique instance name for this run.
    fn instance_name(&self) -> &str;

    /// Build the instance. Called at most once per compile phase.
    fn compile(&self) -> CompileOutcome;

    /// Worker id in `0..budget` for the next test invocation. Ids held by
    /// tests still running on this instance must not be handed out again.
    fn allocate_worker_id(&self, budget: usize) -> usize;

    /// Called once the test that received `worker_id` has finished.
    fn release_worker_id(&self, worker_id: usize) {
        let _ = worker_id;
    }

    /// Run one case against the compiled instance.
    fn test(
        &self,
        source: &Path,
        input: Option<&Path>,
        expected: Option<&Path>,
        worker_id: usize,
    ) -> TestResult;
}

macro_rules! forward_capability {
    ($($wrapper:ty),+ $(,)?) => {
        $(
            impl<T: CompilerCapability + ?Sized> CompilerCapability for $wrapper {
                fn instance_name(&self) -> &str {
                    (**self).instance_name()
                }

                fn compile(&self) -> CompileOutcome {
                    (**self).compile()
                }

                fn allocate_worker_id(&self, budget: usize) -> usize {
                    (**self).allocate_worker_id(budget)
                }

                fn release_worker_id(&self, worker_id: usize) {
                    (**self).release_worker_id(worker_id);
                }

                fn test(
                    &self,
                    source: &Path,
                    input: Option<&Path>,
                    expected: Option<&Path>,
                    worker_id: usize,
                ) -> TestResult {
                    (**self).test(source, input, expected, worker_id)
                }
            }
        )+
    };
}

forward_capability!(&T, Box<T>, Arc<T>);
