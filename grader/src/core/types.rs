//! Shared types for cases, verdicts, and compile outcomes.
//!
//! These types carry no behavior beyond construction helpers and are shared
//! by discovery, the capability boundary, and both schedulers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single runnable test: one case directory with its fixtures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Display name, relative to the suite (or suite-prefixed when collected
    /// across a whole testcases root).
    pub name: String,
    /// Source program fed to the compiler under test. Always present.
    pub source: PathBuf,
    /// Optional stdin fixture.
    pub input: Option<PathBuf>,
    /// Optional expected-output fixture.
    pub expected_output: Option<PathBuf>,
}

/// Why a test did not pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CompileError,
    RuntimeError,
    WrongOutput,
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::CompileError => "compile error",
            FailureKind::RuntimeError => "runtime error",
            FailureKind::WrongOutput => "wrong output",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Verdict for one (instance, case) task.
///
/// `Skipped` means the task was cancelled before it started; it is not a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail(FailureKind),
    Skipped,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => f.write_str("PASS"),
            TestStatus::Fail(kind) => write!(f, "FAIL ({kind})"),
            TestStatus::Skipped => f.write_str("SKIPPED"),
        }
    }
}

/// Optional timing figures reported by a capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub compile_time_ms: Option<u64>,
    pub cycle: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub status: TestStatus,
    pub message: String,
    pub actual_output: Option<String>,
    pub expected_output: Option<String>,
    pub metrics: Option<Metrics>,
}

impl TestResult {
    pub fn pass() -> Self {
        Self::with_status(TestStatus::Pass, String::new())
    }

    pub fn fail(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Fail(kind), message.into())
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Skipped, message.into())
    }

    pub fn with_outputs(mut self, actual: Option<String>, expected: Option<String>) -> Self {
        self.actual_output = actual;
        self.expected_output = expected;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Pass
    }

    pub fn is_skipped(&self) -> bool {
        self.status == TestStatus::Skipped
    }

    fn with_status(status: TestStatus, message: String) -> Self {
        Self {
            status,
            message,
            actual_output: None,
            expected_output: None,
            metrics: None,
        }
    }
}

/// Result of one compile attempt: success flag plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOutcome {
    pub success: bool,
    pub message: String,
}

impl CompileOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
