//! Test-only helpers: fixture builders and a scripted compiler capability.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::capability::CompilerCapability;
use crate::core::types::{CompileOutcome, FailureKind, TestCase, TestResult};
use crate::core::worker_slots::WorkerSlots;
use crate::io::discovery::{CASE_MARKER, EXPECTED_FIXTURE, INPUT_FIXTURE};

/// Build a case value rooted at `root/name` without touching the filesystem.
pub fn case_at(root: &Path, name: &str) -> TestCase {
    TestCase {
        name: name.to_string(),
        source: root.join(name).join(CASE_MARKER),
        input: None,
        expected_output: None,
    }
}

/// Create a case directory with optional fixtures.
pub fn write_case(dir: &Path, input: Option<&str>, expected: Option<&str>) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    fs::write(dir.join(CASE_MARKER), "int main() { return 0; }\n")?;
    if let Some(input) = input {
        fs::write(dir.join(INPUT_FIXTURE), input)?;
    }
    if let Some(expected) = expected {
        fs::write(dir.join(EXPECTED_FIXTURE), expected)?;
    }
    Ok(())
}

/// Write a zip archive with the given `(entry name, contents)` pairs.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer = ZipWriter::new(file);
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default())?;
        writer.write_all(contents.as_bytes())?;
    }
    writer.finish()?;
    Ok(())
}

/// Temporary grading workspace: archives dir, testcases dir, cache dir.
pub struct GradingFixture {
    temp: tempfile::TempDir,
}

impl GradingFixture {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn archives_dir(&self) -> PathBuf {
        self.root().join("submissions")
    }

    pub fn testcases_dir(&self) -> PathBuf {
        self.root().join("testcases")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root().join(".tmp").join("zip_sources")
    }

    /// Add a submission whose manifest sits at `project/config.json`.
    pub fn add_submission(&self, name: &str, language: &str) -> Result<PathBuf> {
        let manifest = format!(r#"{{"programming language": "{language}", "object code": "mips"}}"#);
        let path = self.archives_dir().join(format!("{name}.zip"));
        write_zip(
            &path,
            &[
                ("project/config.json", manifest.as_str()),
                ("project/src/main.c", "int main(void) { return 0; }\n"),
            ],
        )?;
        Ok(path)
    }

    pub fn add_case(&self, relative: &str, expected: Option<&str>) -> Result<PathBuf> {
        let dir = self.testcases_dir().join(relative);
        write_case(&dir, None, expected)?;
        Ok(dir)
    }
}

/// Tracks how many scripted calls run at once across instances.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> ProbeGuard<'_> {
        let now = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard { probe: self }
    }
}

struct ProbeGuard<'a> {
    probe: &'a ConcurrencyProbe,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.probe.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One recorded `test` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCall {
    pub source: PathBuf,
    pub worker_id: usize,
}

type TestHook = Arc<dyn Fn() + Send + Sync>;

/// Deterministic capability that records every call.
///
/// Compiles succeed unless [`failing_compile`](Self::failing_compile) is set;
/// tests pass unless the case directory is listed via
/// [`failing_case`](Self::failing_case).
pub struct ScriptedCompiler {
    name: String,
    compile_failure: Option<String>,
    failing_cases: Vec<String>,
    delay: Duration,
    case_delays: HashMap<String, Duration>,
    probe: Option<ConcurrencyProbe>,
    hook: Option<TestHook>,
    slots: WorkerSlots,
    compile_calls: AtomicUsize,
    test_calls: Mutex<Vec<TestCall>>,
    running_ids: Mutex<HashSet<usize>>,
    id_clashes: AtomicUsize,
}

impl ScriptedCompiler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compile_failure: None,
            failing_cases: Vec::new(),
            delay: Duration::ZERO,
            case_delays: HashMap::new(),
            probe: None,
            hook: None,
            slots: WorkerSlots::new(),
            compile_calls: AtomicUsize::new(0),
            test_calls: Mutex::new(Vec::new()),
            running_ids: Mutex::new(HashSet::new()),
            id_clashes: AtomicUsize::new(0),
        }
    }

    pub fn failing_compile(mut self, message: &str) -> Self {
        self.compile_failure = Some(message.to_string());
        self
    }

    pub fn failing_case(mut self, case_dir_name: &str) -> Self {
        self.failing_cases.push(case_dir_name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make tests of one case directory take `delay` instead of the default.
    pub fn with_case_delay(mut self, case_dir_name: &str, delay: Duration) -> Self {
        self.case_delays.insert(case_dir_name.to_string(), delay);
        self
    }

    pub fn with_probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Run `hook` at the start of every `test` call.
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn compile_calls(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }

    pub fn test_calls(&self) -> Vec<TestCall> {
        self.test_calls.lock().expect("test calls lock").clone()
    }

    /// Tests that started while another test on this instance held the same
    /// worker id.
    pub fn worker_id_clashes(&self) -> usize {
        self.id_clashes.load(Ordering::SeqCst)
    }

    pub fn held_worker_ids(&self) -> usize {
        self.slots.in_use()
    }

    fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl CompilerCapability for ScriptedCompiler {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn compile(&self) -> CompileOutcome {
        let _guard = self.probe.as_ref().map(ConcurrencyProbe::enter);
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(self.delay);
        match &self.compile_failure {
            Some(message) => CompileOutcome::failure(message.clone()),
            None => CompileOutcome::success("build ok"),
        }
    }

    fn allocate_worker_id(&self, budget: usize) -> usize {
        self.slots.allocate(budget)
    }

    fn release_worker_id(&self, worker_id: usize) {
        self.slots.release(worker_id);
    }

    fn test(
        &self,
        source: &Path,
        _input: Option<&Path>,
        _expected: Option<&Path>,
        worker_id: usize,
    ) -> TestResult {
        let _guard = self.probe.as_ref().map(ConcurrencyProbe::enter);
        if let Some(hook) = &self.hook {
            hook();
        }
        if !self
            .running_ids
            .lock()
            .expect("running ids lock")
            .insert(worker_id)
        {
            self.id_clashes.fetch_add(1, Ordering::SeqCst);
        }
        self.test_calls
            .lock()
            .expect("test calls lock")
            .push(TestCall {
                source: source.to_path_buf(),
                worker_id,
            });
        let case_dir = source
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.pause(self.case_delays.get(&case_dir).copied().unwrap_or(self.delay));
        self.running_ids
            .lock()
            .expect("running ids lock")
            .remove(&worker_id);
        if self.failing_cases.contains(&case_dir) {
            TestResult::fail(FailureKind::WrongOutput, "output mismatch")
                .with_outputs(Some("1\n".to_string()), Some("2\n".to_string()))
        } else {
            TestResult::pass()
        }
    }
}
