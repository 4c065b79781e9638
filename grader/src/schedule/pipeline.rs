//! One grading run: extract, compile, then test the compiled subset.
//!
//! Invalid submissions and submissions whose extraction or capability setup
//! fails never reach the compile phase. Submissions whose compile fails never
//! reach the test phase. Every instance handed in gets exactly one report.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{Progress, Scheduler, TaskRecord, compiled_subset};
use crate::capability::CompilerCapability;
use crate::core::types::{CompileOutcome, TestCase, TestResult, TestStatus};
use crate::io::archive::CompilerInstance;
use crate::io::cache::{Extraction, extract_instance};

/// Furthest point an instance reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "reason", rename_all = "snake_case")]
pub enum InstanceStage {
    /// Submission rejected at validation.
    Invalid(String),
    /// Extraction or capability construction failed.
    SetupFailed(String),
    CompileFailed(String),
    Tested,
}

/// Per-instance verdict totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceReport {
    pub name: String,
    pub stage: InstanceStage,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl InstanceReport {
    fn new(name: &str, stage: InstanceStage) -> Self {
        Self {
            name: name.to_string(),
            stage,
            passed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    fn count(&mut self, result: &TestResult) {
        match result.status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail(_) => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport<'a> {
    /// One entry per instance, in the order they were handed in.
    pub instances: Vec<InstanceReport>,
    /// Test records in completion order.
    pub records: Vec<TaskRecord<'a>>,
}

impl PipelineReport<'_> {
    pub fn instance(&self, name: &str) -> Option<&InstanceReport> {
        self.instances.iter().find(|report| report.name == name)
    }
}

/// Progress notifications, delivered on the calling thread.
#[derive(Debug)]
pub enum PipelineEvent<'e> {
    /// Instance dropped before compiling; `stage` says why.
    Rejected {
        instance: &'e str,
        stage: &'e InstanceStage,
    },
    Compiled {
        instance: &'e str,
        outcome: &'e CompileOutcome,
    },
    Tested {
        instance: &'e str,
        case: &'e TestCase,
        result: &'e TestResult,
        progress: Progress,
    },
}

impl Scheduler {
    /// Grade `instances` against `cases`.
    ///
    /// Valid instances are extracted into `cache_dir` and turned into
    /// capabilities by `make_capability`, which must report the instance's
    /// own name. The compile and test phases then run as in
    /// [`compile_all`](Self::compile_all) and [`run_tests`](Self::run_tests).
    #[instrument(skip_all, fields(instances = instances.len(), cases = cases.len()))]
    pub fn run_pipeline<'a, C, M, F>(
        &self,
        instances: &[CompilerInstance],
        cache_dir: &Path,
        cases: &'a [TestCase],
        mut make_capability: M,
        mut on_event: F,
    ) -> PipelineReport<'a>
    where
        C: CompilerCapability,
        M: FnMut(&CompilerInstance, &Extraction) -> Result<C>,
        F: FnMut(PipelineEvent<'_>),
    {
        let mut reports = Vec::with_capacity(instances.len());
        let mut capabilities = Vec::new();
        let mut report_index: HashMap<String, usize> = HashMap::new();

        for instance in instances {
            let stage = match &instance.invalid_reason {
                Some(reason) => InstanceStage::Invalid(reason.clone()),
                None => match extract_instance(instance, cache_dir)
                    .and_then(|extraction| make_capability(instance, &extraction))
                {
                    Ok(capability) => {
                        if capability.instance_name() != instance.name {
                            warn!(
                                instance = %instance.name,
                                capability = capability.instance_name(),
                                "capability reports a different name"
                            );
                        }
                        report_index.insert(capability.instance_name().to_string(), reports.len());
                        capabilities.push(capability);
                        InstanceStage::Tested
                    }
                    Err(err) => InstanceStage::SetupFailed(format!("{err:#}")),
                },
            };
            let report = InstanceReport::new(&instance.name, stage);
            if report.stage != InstanceStage::Tested {
                warn!(instance = %report.name, stage = ?report.stage, "instance not scheduled");
                on_event(PipelineEvent::Rejected {
                    instance: &report.name,
                    stage: &report.stage,
                });
            }
            reports.push(report);
        }

        let compiled = self.compile_all(&capabilities, |capability, outcome| {
            on_event(PipelineEvent::Compiled {
                instance: capability.instance_name(),
                outcome,
            });
        });
        for (name, outcome) in &compiled {
            if !outcome.success
                && let Some(&index) = report_index.get(name)
            {
                reports[index].stage = InstanceStage::CompileFailed(outcome.message.clone());
            }
        }

        let ready = compiled_subset(&capabilities, &compiled);
        let records = self.run_tests(&ready, cases, |capability, case, result, progress| {
            on_event(PipelineEvent::Tested {
                instance: capability.instance_name(),
                case,
                result,
                progress,
            });
        });
        for record in &records {
            if let Some(&index) = report_index.get(&record.instance) {
                reports[index].count(&record.result);
            }
        }

        info!(
            scheduled = ready.len(),
            tasks = records.len(),
            "grading run finished"
        );
        PipelineReport {
            instances: reports,
            records,
        }
    }
}
