//! CLI command implementations.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use grader::exit_codes;
use grader::io::archive::{
    CompilerInstance, InstanceRegistry, InstanceSelection, discover_instances,
};
use grader::io::cache::{clean_cache, extract_instance};
use grader::io::config::{self, GraderConfig};
use grader::io::discovery::{discover_all, discover_test_libs, filter_cases};
use grader::io::scaffold;
use serde::Serialize;
use tracing::{debug, info};

fn registry(cfg: &GraderConfig) -> InstanceRegistry {
    discover_instances(&cfg.paths.archives_dir, cfg.discovery.recursive)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialize json")?);
    Ok(())
}

fn display_relative(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
        Ok(relative) => relative.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// Print valid instances, then invalid ones with their reason.
pub fn list_instances(cfg: &GraderConfig, json: bool) -> Result<i32> {
    let registry = registry(cfg);
    if json {
        print_json(&registry)?;
    } else {
        for instance in registry.valid() {
            println!(
                "valid: {} language={} object_code={}",
                instance.name,
                instance.language.as_deref().unwrap_or("-"),
                instance.object_code.as_deref().unwrap_or("-"),
            );
        }
        for instance in registry.invalid() {
            println!(
                "invalid: {} reason={}",
                instance.name,
                instance.invalid_reason.as_deref().unwrap_or_default()
            );
        }
    }
    if registry.instances.is_empty() {
        eprintln!(
            "no archives found under {}",
            cfg.paths.archives_dir.display()
        );
        return Ok(exit_codes::EMPTY);
    }
    Ok(exit_codes::OK)
}

pub fn list_suites(cfg: &GraderConfig, json: bool) -> Result<i32> {
    let root = &cfg.paths.testcases_dir;
    let suites: Vec<String> = discover_test_libs(root)
        .iter()
        .map(|suite| display_relative(root, suite))
        .collect();
    if json {
        print_json(&suites)?;
    } else {
        for suite in &suites {
            println!("{suite}");
        }
    }
    if suites.is_empty() {
        eprintln!("no test suites found under {}", root.display());
        return Ok(exit_codes::EMPTY);
    }
    Ok(exit_codes::OK)
}

pub fn list_cases(cfg: &GraderConfig, patterns: &[String], json: bool) -> Result<i32> {
    let cases = filter_cases(discover_all(&cfg.paths.testcases_dir), patterns);
    debug!(count = cases.len(), "cases selected");
    if json {
        print_json(&cases)?;
    } else {
        for case in &cases {
            let fixtures = match (&case.input, &case.expected_output) {
                (Some(_), Some(_)) => "in+ans",
                (Some(_), None) => "in",
                (None, Some(_)) => "ans",
                (None, None) => "-",
            };
            println!("{} fixtures={}", case.name, fixtures);
        }
    }
    if cases.is_empty() {
        eprintln!("no test cases matched");
        return Ok(exit_codes::EMPTY);
    }
    Ok(exit_codes::OK)
}

/// Resolve `--compiler` arguments. Existing files are looked up by archive
/// path; anything else matches names. Unmatched selectors are reported.
fn select_instances<'a>(
    registry: &'a InstanceRegistry,
    selectors: &[String],
) -> Vec<&'a CompilerInstance> {
    if selectors.is_empty() {
        return registry.valid().collect();
    }
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for selector in selectors {
        let path = Path::new(selector);
        let matches: Vec<&CompilerInstance> = if path.is_file() {
            registry
                .find_by_archive(path)
                .filter(|instance| instance.is_valid())
                .into_iter()
                .collect()
        } else {
            registry.select(std::slice::from_ref(selector))
        };
        if matches.is_empty() {
            eprintln!("warning: no valid instance matches {selector}");
        }
        for instance in matches {
            if seen.insert(instance.name.as_str()) {
                selected.push(instance);
            }
        }
    }
    selected
}

/// Extract selected instances. One failed extraction does not stop the rest.
///
/// `project` grades a single archive, inside or outside the archives
/// directory, and takes precedence over name selectors.
pub fn extract(cfg: &GraderConfig, selectors: &[String], project: Option<&Path>) -> Result<i32> {
    let registry = registry(cfg);
    let selected: Vec<CompilerInstance> = match project {
        Some(archive) => {
            if !archive.is_file() {
                eprintln!("no archive at {}", archive.display());
                return Ok(exit_codes::EMPTY);
            }
            registry.resolve(&InstanceSelection::Archive(archive.to_path_buf()))
        }
        None => {
            for instance in registry.invalid() {
                eprintln!(
                    "skipping {}: {}",
                    instance.name,
                    instance.invalid_reason.as_deref().unwrap_or_default()
                );
            }
            select_instances(&registry, selectors)
                .into_iter()
                .cloned()
                .collect()
        }
    };
    let (selected, rejected): (Vec<_>, Vec<_>) =
        selected.into_iter().partition(CompilerInstance::is_valid);
    if project.is_some() {
        for instance in &rejected {
            eprintln!(
                "skipping {}: {}",
                instance.name,
                instance.invalid_reason.as_deref().unwrap_or_default()
            );
        }
    }
    if selected.is_empty() {
        eprintln!("no valid instances selected");
        return Ok(exit_codes::EMPTY);
    }

    let mut failures = 0;
    for instance in selected {
        match extract_instance(&instance, &cfg.paths.cache_dir) {
            Ok(extraction) => println!(
                "{}: {} project_root={}",
                instance.name,
                if extraction.reused { "cached" } else { "extracted" },
                extraction.project_root.display()
            ),
            Err(err) => {
                failures += 1;
                eprintln!("{}: {:#}", instance.name, err);
            }
        }
    }
    info!(failures, "extract finished");
    Ok(if failures == 0 {
        exit_codes::OK
    } else {
        exit_codes::INVALID
    })
}

pub fn new_case(cfg: &GraderConfig, suite: &Path) -> Result<i32> {
    let suite = cfg.paths.testcases_dir.join(suite);
    let dir = scaffold::new_case(&suite)?;
    println!("{}", dir.display());
    Ok(exit_codes::OK)
}

pub fn clean(cfg: &GraderConfig) -> Result<i32> {
    let cache_dir = &cfg.paths.cache_dir;
    if clean_cache(cache_dir)? {
        println!("removed {}", cache_dir.display());
    } else {
        println!("nothing to clean at {}", cache_dir.display());
    }
    Ok(exit_codes::OK)
}

pub fn init_config(path: &Path, force: bool) -> Result<i32> {
    if config::init_config(path, force)? {
        println!("wrote {}", path.display());
    } else {
        println!("kept existing {} (use --force to overwrite)", path.display());
    }
    Ok(exit_codes::OK)
}
