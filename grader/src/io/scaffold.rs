//! Scaffolding for new case directories (`testcaseN/`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use super::discovery::{CASE_MARKER, EXPECTED_FIXTURE, INPUT_FIXTURE};

static CASE_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^testcase(\d+)$").expect("valid regex"));

const SOURCE_TEMPLATE: &str = "/* Description:
 *   [Add description here]
 */

int main() {
    return 0;
}
";

/// Next free `testcaseN` number in `suite` (highest existing + 1, from 1).
pub fn next_case_number(suite: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(suite) else {
        return 1;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            CASE_DIR_RE
                .captures(&name)
                .and_then(|caps| caps[1].parse::<u64>().ok())
        })
        .max()
        .map_or(1, |max| max + 1)
}

/// Prepare `dir` as a case: template source (kept if present), empty input,
/// and no stale expected output.
pub fn init_case(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let source = dir.join(CASE_MARKER);
    if !source.exists() {
        fs::write(&source, SOURCE_TEMPLATE)
            .with_context(|| format!("write {}", source.display()))?;
    }
    let input = dir.join(INPUT_FIXTURE);
    if !input.exists() {
        fs::write(&input, "").with_context(|| format!("write {}", input.display()))?;
    }
    let expected = dir.join(EXPECTED_FIXTURE);
    if expected.exists() {
        fs::remove_file(&expected).with_context(|| format!("remove {}", expected.display()))?;
    }
    Ok(())
}

/// Create the next `testcaseN/` under `suite` and return its path.
pub fn new_case(suite: &Path) -> Result<PathBuf> {
    let dir = suite.join(format!("testcase{}", next_case_number(suite)));
    init_case(&dir)?;
    Ok(dir)
}
