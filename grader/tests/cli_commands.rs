//! CLI tests: spawn the grader binary against a temporary layout.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use grader::exit_codes;
use grader::test_support::{GradingFixture, write_zip};

fn grader(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_grader"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn grader")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn instances_lists_valid_and_invalid_submissions() {
    let fixture = GradingFixture::new().expect("fixture");
    fixture.add_submission("team2", "C").expect("team2");
    write_zip(
        &fixture.archives_dir().join("team10.zip"),
        &[("main.c", "int main(void) { return 0; }\n")],
    )
    .expect("team10");

    let output = grader(fixture.root(), &["instances"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("valid: team2 language=c object_code=mips"), "{text}");
    assert!(text.contains("invalid: team10 reason=missing manifest (config.json)"), "{text}");

    let output = grader(fixture.root(), &["instances", "--json"]);
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let names: Vec<&str> = parsed["instances"]
        .as_array()
        .expect("instances array")
        .iter()
        .filter_map(|instance| instance["name"].as_str())
        .collect();
    assert_eq!(names, vec!["team2", "team10"]);
}

#[test]
fn empty_layout_exits_with_empty_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = grader(temp.path(), &["instances"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY));
    let output = grader(temp.path(), &["cases"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY));
}

#[test]
fn cases_are_prefixed_by_suite_and_filtered() {
    let fixture = GradingFixture::new().expect("fixture");
    fixture.add_case("lexer/testcase1", Some("ok\n")).expect("case");
    fixture.add_case("lexer/testcase2", None).expect("case");
    fixture.add_case("parser/testcase1", None).expect("case");

    let output = grader(fixture.root(), &["suites"]);
    assert_eq!(stdout(&output).lines().collect::<Vec<_>>(), vec!["lexer", "parser"]);

    let output = grader(fixture.root(), &["cases", "--match", "LEXER/"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        stdout(&output).lines().collect::<Vec<_>>(),
        vec!["lexer/testcase1 fixtures=ans", "lexer/testcase2 fixtures=-"]
    );
}

#[test]
fn new_case_then_extract_and_clean() {
    let fixture = GradingFixture::new().expect("fixture");
    fixture.add_case("lexer/testcase1", None).expect("case");
    fixture.add_submission("team1", "C").expect("submission");
    fs::write(
        fixture.root().join("grader.toml"),
        "[parallel]\nmax_workers = 2\n",
    )
    .expect("config");

    let output = grader(fixture.root(), &["new-case", "lexer"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let created = fixture.testcases_dir().join("lexer").join("testcase2");
    assert!(created.join("testfile.txt").is_file());
    assert!(created.join("in.txt").is_file());

    let output = grader(fixture.root(), &["extract", "--compiler", "TEAM1.zip"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("team1: extracted"));
    let output = grader(fixture.root(), &["extract"]);
    assert!(stdout(&output).contains("team1: cached"));

    let output = grader(fixture.root(), &["extract", "--compiler", "nobody"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY));

    let output = grader(fixture.root(), &["clean"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(!fixture.cache_dir().exists());
}

#[test]
fn malformed_config_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("grader.toml"), "[parallel]\nmax_workers = 0\n").expect("config");
    let output = grader(temp.path(), &["suites"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_workers"));
}

#[test]
fn extract_single_project_outside_archives_dir() {
    let fixture = GradingFixture::new().expect("fixture");
    fixture.add_submission("team1", "C").expect("team1");
    write_zip(
        &fixture.root().join("loose").join("solo.zip"),
        &[
            ("config.json", r#"{"programming language": "C"}"#),
            ("main.c", "int main(void) { return 0; }\n"),
        ],
    )
    .expect("solo");

    let output = grader(fixture.root(), &["extract", "--project", "loose/solo.zip"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let out = stdout(&output);
    assert!(out.contains("solo: extracted"), "{out}");
    assert!(!out.contains("team1"), "{out}");

    let output = grader(fixture.root(), &["extract", "--project", "loose/missing.zip"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY));
}

#[test]
fn init_config_writes_loadable_defaults_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = grader(temp.path(), &["init-config"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let written = fs::read_to_string(temp.path().join("grader.toml")).expect("config");
    assert!(written.contains("max_workers"));

    fs::write(temp.path().join("grader.toml"), "[parallel]\nmax_workers = 3\n").expect("edit");
    let output = grader(temp.path(), &["init-config"]);
    assert!(stdout(&output).contains("kept existing"));
    let kept = fs::read_to_string(temp.path().join("grader.toml")).expect("config");
    assert!(kept.contains("max_workers = 3"));

    let output = grader(temp.path(), &["init-config", "--force"]);
    assert!(stdout(&output).contains("wrote"));
    let output = grader(temp.path(), &["suites"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY));
}
