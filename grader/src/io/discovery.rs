//! Test suite and case discovery.
//!
//! A *case directory* directly contains [`CASE_MARKER`]. Walks stop at the
//! first case directory on a path, so case directories never nest. Hidden
//! directories are never entered. Sibling order follows natural ordering.
//!
//! Nothing here is cached: every call re-walks the filesystem. Missing roots
//! and unreadable directories degrade to empty results instead of errors.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::core::natural::{natural_cmp, sort_natural_by_key};
use crate::core::types::TestCase;

/// Marker file that turns a directory into a case; also the source program.
pub const CASE_MARKER: &str = "testfile.txt";
/// Optional stdin fixture next to the marker.
pub const INPUT_FIXTURE: &str = "in.txt";
/// Optional expected-output fixture next to the marker.
pub const EXPECTED_FIXTURE: &str = "ans.txt";

pub fn is_case_dir(dir: &Path) -> bool {
    dir.join(CASE_MARKER).is_file()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn sorted_walk(root: &Path) -> WalkDir {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by(|left, right| {
            natural_cmp(
                &left.file_name().to_string_lossy(),
                &right.file_name().to_string_lossy(),
            )
        })
}

/// Depth-first list of case directories under `root`, in natural sibling order.
fn case_dirs(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    if !root.is_dir() {
        return found;
    }
    let mut walker = sorted_walk(root).into_iter().filter_entry(|entry| !is_hidden(entry));
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        if is_case_dir(entry.path()) {
            found.push(entry.into_path());
            walker.skip_current_dir();
        }
    }
    found
}

/// True as soon as any case directory is found under `root`.
fn has_case_in_subtree(root: &Path) -> bool {
    WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
        .filter_map(Result::ok)
        .any(|entry| entry.file_type().is_dir() && is_case_dir(entry.path()))
}

fn relative_name(root: &Path, dir: &Path) -> String {
    let Ok(relative) = dir.strip_prefix(root) else {
        return dir.display().to_string();
    };
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

fn case_from_dir(dir: &Path, name: String) -> TestCase {
    let input = dir.join(INPUT_FIXTURE);
    let expected = dir.join(EXPECTED_FIXTURE);
    TestCase {
        name,
        source: dir.join(CASE_MARKER),
        input: input.is_file().then_some(input),
        expected_output: expected.is_file().then_some(expected),
    }
}

/// Collect every case in a suite, sorted by natural order of case name.
///
/// Case names are the case directory's path relative to `suite`; a suite that
/// is itself a case directory yields one case named after the suite.
#[instrument(skip_all, fields(suite = %suite.display()))]
pub fn discover_in_dir(suite: &Path) -> Vec<TestCase> {
    let mut cases: Vec<TestCase> = case_dirs(suite)
        .into_iter()
        .map(|dir| {
            let name = match relative_name(suite, &dir) {
                name if name.is_empty() => dir_name(suite),
                name => name,
            };
            case_from_dir(&dir, name)
        })
        .collect();
    sort_natural_by_key(&mut cases, |case| &case.name);
    debug!(count = cases.len(), "cases discovered");
    cases
}

fn child_dirs(root: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(root = %root.display(), error = %err, "cannot list directory");
            return Vec::new();
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| !dir_name(path).starts_with('.'))
        .collect();
    dirs.sort_by(|left, right| natural_cmp(&dir_name(left), &dir_name(right)));
    dirs
}

/// List selectable suites under a testcases root.
///
/// The root itself is a suite when it is a case directory or directly holds
/// one. Every immediate child whose subtree holds at least one case directory
/// is a suite as well.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn discover_test_libs(root: &Path) -> Vec<PathBuf> {
    let mut libs = Vec::new();
    if !root.is_dir() {
        return libs;
    }
    let children = child_dirs(root);
    if is_case_dir(root) || children.iter().any(|child| is_case_dir(child)) {
        libs.push(root.to_path_buf());
    }
    libs.extend(
        children
            .into_iter()
            .filter(|child| has_case_in_subtree(child)),
    );
    debug!(count = libs.len(), "suites discovered");
    libs
}

/// Collect cases from every suite under `root`.
///
/// Case names are prefixed with the suite path relative to `root`; cases of
/// the root suite keep their bare names. A case reachable from more than one
/// suite is reported once, under the first suite that lists it.
pub fn discover_all(root: &Path) -> Vec<TestCase> {
    let mut seen = HashSet::new();
    let mut cases = Vec::new();
    for lib in discover_test_libs(root) {
        let prefix = relative_name(root, &lib);
        for mut case in discover_in_dir(&lib) {
            if !seen.insert(case.source.clone()) {
                continue;
            }
            if !prefix.is_empty() {
                case.name = format!("{prefix}/{}", case.name);
            }
            cases.push(case);
        }
    }
    cases
}

/// Keep cases whose name contains any of `patterns` (case-insensitive).
///
/// An empty pattern list keeps everything.
pub fn filter_cases(cases: Vec<TestCase>, patterns: &[String]) -> Vec<TestCase> {
    let lowered: Vec<String> = patterns
        .iter()
        .map(|pattern| pattern.trim().to_lowercase())
        .filter(|pattern| !pattern.is_empty())
        .collect();
    if lowered.is_empty() {
        return cases;
    }
    cases
        .into_iter()
        .filter(|case| {
            let name = case.name.to_lowercase();
            lowered.iter().any(|pattern| name.contains(pattern.as_str()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_case(dir: &Path, input: bool, expected: bool) {
        fs::create_dir_all(dir).expect("case dir");
        fs::write(dir.join(CASE_MARKER), "int main() { return 0; }\n").expect("marker");
        if input {
            fs::write(dir.join(INPUT_FIXTURE), "1 2\n").expect("input");
        }
        if expected {
            fs::write(dir.join(EXPECTED_FIXTURE), "3\n").expect("expected");
        }
    }

    fn names(cases: &[TestCase]) -> Vec<&str> {
        cases.iter().map(|case| case.name.as_str()).collect()
    }

    #[test]
    fn marker_only_case_has_no_fixtures() {
        let temp = tempdir().expect("tempdir");
        let suite = temp.path().join("suite");
        make_case(&suite.join("case1"), false, false);

        let cases = discover_in_dir(&suite);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "case1");
        assert_eq!(cases[0].source, suite.join("case1").join(CASE_MARKER));
        assert!(cases[0].input.is_none());
        assert!(cases[0].expected_output.is_none());
    }

    #[test]
    fn fixtures_attach_when_present() {
        let temp = tempdir().expect("tempdir");
        let suite = temp.path().join("suite");
        make_case(&suite.join("case1"), true, true);

        let cases = discover_in_dir(&suite);
        let case = &cases[0];
        assert_eq!(case.input, Some(suite.join("case1").join(INPUT_FIXTURE)));
        assert_eq!(
            case.expected_output,
            Some(suite.join("case1").join(EXPECTED_FIXTURE))
        );
    }

    #[test]
    fn nested_case_dirs_report_outer_only() {
        let temp = tempdir().expect("tempdir");
        let suite = temp.path().join("suite");
        make_case(&suite.join("outer"), false, false);
        make_case(&suite.join("outer").join("inner"), false, false);

        let cases = discover_in_dir(&suite);
        assert_eq!(names(&cases), vec!["outer"]);
    }

    #[test]
    fn cases_are_naturally_ordered_across_depths() {
        let temp = tempdir().expect("tempdir");
        let suite = temp.path().join("suite");
        make_case(&suite.join("testcase10"), false, false);
        make_case(&suite.join("testcase2"), false, false);
        make_case(&suite.join("group").join("testcase1"), false, false);
        make_case(&suite.join(".hidden").join("testcase3"), false, false);

        let cases = discover_in_dir(&suite);
        assert_eq!(
            names(&cases),
            vec!["group/testcase1", "testcase2", "testcase10"]
        );
    }

    #[test]
    fn suite_that_is_a_case_uses_suite_name() {
        let temp = tempdir().expect("tempdir");
        let suite = temp.path().join("lonely");
        make_case(&suite, false, true);

        let cases = discover_in_dir(&suite);
        assert_eq!(names(&cases), vec!["lonely"]);
    }

    #[test]
    fn missing_root_degrades_to_empty() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("nope");
        assert!(discover_in_dir(&missing).is_empty());
        assert!(discover_test_libs(&missing).is_empty());
        assert!(discover_all(&missing).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directories_degrade_to_partial_results() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        make_case(&root.join("open").join("c1"), false, false);
        make_case(&root.join("open").join("c2"), false, false);
        let locked = root.join("open").join("locked");
        make_case(&locked.join("c3"), false, false);
        make_case(&root.join("sealed").join("c1"), false, false);
        let sealed = root.join("sealed");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("lock");
        fs::set_permissions(&sealed, fs::Permissions::from_mode(0o000)).expect("seal");

        let cases = discover_in_dir(&root.join("open"));
        let libs = discover_test_libs(root);
        let all = discover_all(root);

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock");
        fs::set_permissions(&sealed, fs::Permissions::from_mode(0o755)).expect("unseal");

        // Privileged users can still read locked directories, so only the
        // readable part is asserted exactly.
        let found = names(&cases);
        assert!(found.starts_with(&["c1", "c2"]), "{found:?}");
        assert!(libs.contains(&root.join("open")));
        assert!(names(&all).contains(&"open/c1"));
    }

    #[test]
    fn libs_include_root_with_direct_cases_and_populated_children() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        make_case(&root.join("loose"), false, false);
        make_case(&root.join("suite10").join("a").join("c1"), false, false);
        make_case(&root.join("suite2").join("c1"), false, false);
        fs::create_dir_all(root.join("empty").join("deeper")).expect("empty");
        make_case(&root.join(".git").join("c1"), false, false);

        let libs = discover_test_libs(root);
        assert_eq!(
            libs,
            vec![
                root.to_path_buf(),
                root.join("loose"),
                root.join("suite2"),
                root.join("suite10"),
            ]
        );
    }

    #[test]
    fn root_without_direct_cases_is_not_a_lib() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        make_case(&root.join("suite").join("c1"), false, false);

        assert_eq!(discover_test_libs(root), vec![root.join("suite")]);
    }

    #[test]
    fn discover_all_prefixes_suite_and_dedupes() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        make_case(&root.join("suiteA").join("c2"), false, false);
        make_case(&root.join("suiteA").join("c10"), false, false);
        make_case(&root.join("suiteB").join("deep").join("c1"), false, false);

        let cases = discover_all(root);
        assert_eq!(
            names(&cases),
            vec!["suiteA/c2", "suiteA/c10", "suiteB/deep/c1"]
        );
    }

    #[test]
    fn filter_matches_any_pattern_case_insensitively() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        make_case(&root.join("basic").join("c1"), false, false);
        make_case(&root.join("Regression").join("c1"), false, false);
        make_case(&root.join("perf").join("c1"), false, false);

        let all = discover_all(root);
        let kept = filter_cases(all.clone(), &["regression".to_string(), "PERF".to_string()]);
        assert_eq!(names(&kept), vec!["perf/c1", "Regression/c1"]);
        assert_eq!(filter_cases(all.clone(), &[]).len(), all.len());
    }
}
