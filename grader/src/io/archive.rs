//! Compiler instance discovery from submission archives.
//!
//! Each `.zip` under the archives directory is one compiler instance. The
//! instance name mirrors the archive path relative to that directory with the
//! extension stripped, so names are unique by construction.
//!
//! Validation never fails the scan: a missing, corrupt, or malformed manifest
//! yields an *invalid* instance carrying a human-readable reason.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{Read, Seek};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::core::natural::natural_cmp;

/// Manifest file every submission must carry somewhere inside its archive.
pub const MANIFEST_NAME: &str = "config.json";
const LANGUAGE_FIELD: &str = "programming language";
const OBJECT_CODE_FIELD: &str = "object code";

const IGNORED_PREFIXES: &[&str] = &["__MACOSX/"];
const IGNORED_BASENAMES: &[&str] = &[".ds_store"];

/// One gradable submission derived from one archive. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompilerInstance {
    pub name: String,
    pub archive: PathBuf,
    /// `None` for valid instances; otherwise why the submission is unusable.
    pub invalid_reason: Option<String>,
    pub language: Option<String>,
    pub object_code: Option<String>,
    /// Manifest location inside the archive (`/`-separated).
    pub manifest_path: Option<String>,
    /// Project root inside the archive; empty means the archive root.
    pub project_root: String,
}

impl CompilerInstance {
    pub fn is_valid(&self) -> bool {
        self.invalid_reason.is_none()
    }

    fn invalid(name: String, archive: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            name,
            archive,
            invalid_reason: Some(reason.into()),
            language: None,
            object_code: None,
            manifest_path: None,
            project_root: String::new(),
        }
    }
}

/// Which submissions a grading run covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InstanceSelection {
    #[default]
    All,
    /// Instance names or archive file names, case-insensitive.
    Named(Vec<String>),
    /// One archive. Looked up in the registry, or inspected on its own when
    /// it lives outside the archives directory.
    Archive(PathBuf),
}

fn lowered(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

fn matches_any(instance: &CompilerInstance, wanted: &[String]) -> bool {
    let name = instance.name.to_lowercase();
    let file_name = instance
        .archive
        .file_name()
        .map(|file| file.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    wanted.iter().any(|want| *want == name || *want == file_name)
}

/// All instances found in one scan, valid and invalid, in natural name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceRegistry {
    pub instances: Vec<CompilerInstance>,
}

impl InstanceRegistry {
    pub fn valid(&self) -> impl Iterator<Item = &CompilerInstance> {
        self.instances.iter().filter(|instance| instance.is_valid())
    }

    pub fn invalid(&self) -> impl Iterator<Item = &CompilerInstance> {
        self.instances.iter().filter(|instance| !instance.is_valid())
    }

    /// Valid instances matching any of `names` by instance name or archive
    /// file name, case-insensitively. An empty selection keeps every valid
    /// instance.
    pub fn select(&self, names: &[String]) -> Vec<&CompilerInstance> {
        let wanted = lowered(names);
        self.valid()
            .filter(|instance| wanted.is_empty() || matches_any(instance, &wanted))
            .collect()
    }

    /// Instances covered by `selection`, valid or not, in registry order.
    pub fn resolve(&self, selection: &InstanceSelection) -> Vec<CompilerInstance> {
        match selection {
            InstanceSelection::All => self.instances.clone(),
            InstanceSelection::Named(names) => {
                let wanted = lowered(names);
                self.instances
                    .iter()
                    .filter(|instance| matches_any(instance, &wanted))
                    .cloned()
                    .collect()
            }
            InstanceSelection::Archive(archive) => {
                let instance = self.find_by_archive(archive).cloned().unwrap_or_else(|| {
                    let name = archive
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                        .unwrap_or_else(|| archive.display().to_string());
                    inspect_archive(name, archive.clone())
                });
                vec![instance]
            }
        }
    }

    /// Instance built from the given archive path, if any.
    pub fn find_by_archive(&self, archive: &Path) -> Option<&CompilerInstance> {
        let target = fs::canonicalize(archive).ok()?;
        self.instances.iter().find(|instance| {
            fs::canonicalize(&instance.archive)
                .map(|path| path == target)
                .unwrap_or(false)
        })
    }
}

fn is_zip(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn instance_name(root: &Path, archive: &Path, keep_extension: bool) -> String {
    let relative = archive.strip_prefix(root).unwrap_or(archive);
    let relative = if keep_extension {
        relative.to_path_buf()
    } else {
        relative.with_extension("")
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

fn archive_paths(root: &Path, recursive: bool) -> Vec<PathBuf> {
    if recursive {
        return WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .map(|entry| entry.into_path())
            .filter(|path| is_zip(path))
            .collect();
    }
    match fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_zip(path))
            .collect(),
        Err(err) => {
            warn!(root = %root.display(), error = %err, "cannot list archives directory");
            Vec::new()
        }
    }
}

/// Name each archive after its relative path without extension. Archives
/// whose stems collide (`team.zip` next to `team.ZIP`) keep their extension,
/// and any name still taken gets a `#N` suffix.
fn unique_names(root: &Path, archives: Vec<PathBuf>) -> Vec<(String, PathBuf)> {
    let mut stems: HashMap<String, usize> = HashMap::new();
    for archive in &archives {
        *stems.entry(instance_name(root, archive, false)).or_default() += 1;
    }
    let mut taken = HashSet::new();
    let mut named = Vec::with_capacity(archives.len());
    for archive in archives {
        let stem = instance_name(root, &archive, false);
        let mut name = if stems[&stem] > 1 {
            instance_name(root, &archive, true)
        } else {
            stem.clone()
        };
        if taken.contains(&name) {
            let base = name.clone();
            let mut suffix = 2;
            while taken.contains(&name) {
                name = format!("{base}#{suffix}");
                suffix += 1;
            }
        }
        if name != stem {
            warn!(archive = %archive.display(), %name, "instance name collision resolved");
        }
        taken.insert(name.clone());
        named.push((name, archive));
    }
    named
}

/// Scan `root` for submission archives and validate each one.
///
/// With `recursive`, archives in nested directories are included and their
/// instance names keep the relative directory (`group/team.zip` becomes
/// `group/team`). A missing root yields an empty registry.
#[instrument(skip_all, fields(root = %root.display(), recursive = recursive))]
pub fn discover_instances(root: &Path, recursive: bool) -> InstanceRegistry {
    if !root.is_dir() {
        debug!("archives directory missing");
        return InstanceRegistry::default();
    }
    let mut named = unique_names(root, archive_paths(root, recursive));
    named.sort_by(|left, right| natural_cmp(&left.0, &right.0));

    let instances: Vec<CompilerInstance> = named
        .into_iter()
        .map(|(name, archive)| inspect_archive(name, archive))
        .collect();
    debug!(
        total = instances.len(),
        valid = instances.iter().filter(|instance| instance.is_valid()).count(),
        "instances discovered"
    );
    InstanceRegistry { instances }
}

/// Validate one archive and build its instance record.
pub fn inspect_archive(name: String, archive: PathBuf) -> CompilerInstance {
    match read_manifest(&archive) {
        Ok(Manifest::Missing) => {
            debug!(instance = %name, "manifest missing");
            CompilerInstance::invalid(name, archive, format!("missing manifest ({MANIFEST_NAME})"))
        }
        Ok(Manifest::Malformed { path, reason }) => {
            debug!(instance = %name, %reason, "manifest malformed");
            CompilerInstance {
                manifest_path: Some(path.clone()),
                project_root: parent_of(&path),
                ..CompilerInstance::invalid(name, archive, reason)
            }
        }
        Ok(Manifest::Found { path, fields }) => CompilerInstance {
            name,
            archive,
            invalid_reason: None,
            language: string_field(&fields, LANGUAGE_FIELD),
            object_code: string_field(&fields, OBJECT_CODE_FIELD),
            project_root: parent_of(&path),
            manifest_path: Some(path),
        },
        Err(err) => {
            debug!(instance = %name, error = %err, "archive unreadable");
            CompilerInstance::invalid(name, archive, format!("corrupt archive: {err:#}"))
        }
    }
}

enum Manifest {
    Missing,
    Malformed { path: String, reason: String },
    Found {
        path: String,
        fields: serde_json::Map<String, Value>,
    },
}

fn read_manifest(archive_path: &Path) -> Result<Manifest> {
    let file =
        File::open(archive_path).with_context(|| format!("open {}", archive_path.display()))?;
    let mut archive = ZipArchive::new(file).context("read zip directory")?;
    let Some(path) = find_manifest(&archive) else {
        return Ok(Manifest::Missing);
    };
    Ok(parse_manifest(&mut archive, path))
}

fn parse_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>, path: String) -> Manifest {
    let mut raw = Vec::new();
    let read = archive
        .by_name(&path)
        .map_err(anyhow::Error::from)
        .and_then(|mut entry| entry.read_to_end(&mut raw).map_err(anyhow::Error::from));
    if let Err(err) = read {
        return Manifest::Malformed {
            path,
            reason: format!("failed to read {MANIFEST_NAME}: {err}"),
        };
    }
    match serde_json::from_str::<Value>(&String::from_utf8_lossy(&raw)) {
        Ok(Value::Object(fields)) => Manifest::Found { path, fields },
        Ok(_) => Manifest::Malformed {
            path,
            reason: format!("{MANIFEST_NAME} is not a JSON object"),
        },
        Err(err) => Manifest::Malformed {
            path,
            reason: format!("{MANIFEST_NAME} parse failed: {err}"),
        },
    }
}

/// Normalize an entry name to `/` separators.
pub(crate) fn normalize_entry_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Directory entries and platform noise (`__MACOSX/`, `.DS_Store`) are skipped.
pub(crate) fn is_ignored_entry(normalized: &str) -> bool {
    if normalized.is_empty() || normalized.ends_with('/') {
        return true;
    }
    if IGNORED_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
    {
        return true;
    }
    let base = normalized.rsplit('/').next().unwrap_or(normalized);
    IGNORED_BASENAMES.contains(&base.to_lowercase().as_str())
}

/// Shallowest manifest wins; ties go to the shortest path.
fn find_manifest<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<String> {
    let suffix = format!("/{MANIFEST_NAME}");
    archive
        .file_names()
        .filter(|raw| {
            let name = normalize_entry_name(raw);
            if is_ignored_entry(&name) {
                return false;
            }
            let lower = name.to_lowercase();
            lower == MANIFEST_NAME || lower.ends_with(&suffix)
        })
        .min_by_key(|raw| {
            let name = normalize_entry_name(raw);
            (name.matches('/').count(), name.len())
        })
        .map(str::to_string)
}

fn parent_of(entry: &str) -> String {
    let normalized = normalize_entry_name(entry);
    match normalized.rsplit_once('/') {
        Some((parent, _)) => parent.trim_end_matches('/').to_string(),
        None => String::new(),
    }
}

fn string_field(fields: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    let value = match fields.get(key)? {
        Value::String(text) => text.clone(),
        Value::Null => return None,
        other => other.to_string(),
    };
    let value = value.trim().to_lowercase();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).expect("create zip");
        let mut writer = ZipWriter::new(file);
        for (name, contents) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start file");
            writer.write_all(contents.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish zip");
    }

    const MANIFEST: &str = r#"{"programming language": " C++ ", "object code": "MIPS"}"#;

    #[test]
    fn valid_archive_reads_manifest_fields() {
        let temp = tempdir().expect("tempdir");
        write_zip(
            &temp.path().join("team1.zip"),
            &[("proj/config.json", MANIFEST), ("proj/src/main.cpp", "")],
        );

        let registry = discover_instances(temp.path(), false);
        assert_eq!(registry.instances.len(), 1);
        let instance = &registry.instances[0];
        assert!(instance.is_valid());
        assert_eq!(instance.name, "team1");
        assert_eq!(instance.language.as_deref(), Some("c++"));
        assert_eq!(instance.object_code.as_deref(), Some("mips"));
        assert_eq!(instance.manifest_path.as_deref(), Some("proj/config.json"));
        assert_eq!(instance.project_root, "proj");
    }

    #[test]
    fn shallowest_then_shortest_manifest_wins() {
        let temp = tempdir().expect("tempdir");
        write_zip(
            &temp.path().join("team.zip"),
            &[
                ("a/b/config.json", "{}"),
                ("longer/config.json", "{}"),
                ("x/config.json", "{}"),
                ("__MACOSX/config.json", "{}"),
            ],
        );

        let registry = discover_instances(temp.path(), false);
        let instance = &registry.instances[0];
        assert_eq!(instance.manifest_path.as_deref(), Some("x/config.json"));
        assert_eq!(instance.project_root, "x");
        assert_eq!(instance.language, None);
    }

    #[test]
    fn invalid_archives_carry_reasons() {
        let temp = tempdir().expect("tempdir");
        write_zip(&temp.path().join("no_manifest.zip"), &[("src/main.c", "")]);
        write_zip(&temp.path().join("array.zip"), &[("config.json", "[1, 2]")]);
        write_zip(&temp.path().join("broken_json.zip"), &[("config.json", "{nope")]);
        fs::write(temp.path().join("garbage.zip"), b"not a zip at all").expect("garbage");

        let registry = discover_instances(temp.path(), false);
        assert_eq!(registry.valid().count(), 0);
        let reason = |name: &str| {
            registry
                .instances
                .iter()
                .find(|instance| instance.name == name)
                .and_then(|instance| instance.invalid_reason.clone())
                .expect("reason")
        };
        assert!(reason("no_manifest").contains("missing manifest"));
        assert!(reason("array").contains("not a JSON object"));
        assert!(reason("broken_json").contains("parse failed"));
        assert!(reason("garbage").contains("corrupt archive"));
    }

    #[test]
    fn recursive_scan_names_by_relative_path() {
        let temp = tempdir().expect("tempdir");
        let group = temp.path().join("class2");
        fs::create_dir_all(&group).expect("group dir");
        write_zip(&group.join("team.zip"), &[("config.json", MANIFEST)]);
        write_zip(&temp.path().join("team.ZIP"), &[("config.json", MANIFEST)]);
        fs::write(temp.path().join("notes.txt"), "ignore me").expect("notes");

        let flat = discover_instances(temp.path(), false);
        let flat_names: Vec<&str> = flat.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(flat_names, vec!["team"]);

        let deep = discover_instances(temp.path(), true);
        let deep_names: Vec<&str> = deep.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(deep_names, vec!["class2/team", "team"]);
    }

    #[test]
    fn stems_differing_only_in_extension_case_stay_distinct() {
        let temp = tempdir().expect("tempdir");
        write_zip(&temp.path().join("team.zip"), &[("config.json", MANIFEST)]);
        write_zip(&temp.path().join("team.ZIP"), &[("config.json", MANIFEST)]);
        write_zip(&temp.path().join("solo.zip"), &[("config.json", MANIFEST)]);

        let registry = discover_instances(temp.path(), false);
        let mut names: Vec<&str> = registry.instances.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"solo"));
        assert!(names.contains(&"team.zip"));
        assert!(names.contains(&"team.ZIP"));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn leftover_collisions_get_numbered() {
        let temp = tempdir().expect("tempdir");
        let archives = vec![
            temp.path().join("team.zip"),
            temp.path().join("team.ZIP"),
            temp.path().join("team.ZIP.zip"),
        ];
        let names: Vec<String> = unique_names(temp.path(), archives)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["team.zip", "team.ZIP", "team.ZIP#2"]);
    }

    #[test]
    fn select_matches_name_or_file_name() {
        let temp = tempdir().expect("tempdir");
        write_zip(&temp.path().join("Alpha.zip"), &[("config.json", MANIFEST)]);
        write_zip(&temp.path().join("beta.zip"), &[("config.json", MANIFEST)]);
        write_zip(&temp.path().join("gamma.zip"), &[("readme.md", "")]);

        let registry = discover_instances(temp.path(), false);
        let picked: Vec<&str> = registry
            .select(&["alpha".to_string(), "BETA.zip".to_string(), "gamma".to_string()])
            .into_iter()
            .map(|instance| instance.name.as_str())
            .collect();
        assert_eq!(picked, vec!["Alpha", "beta"]);
        assert_eq!(registry.select(&[]).len(), 2);

        let found = registry
            .find_by_archive(&temp.path().join("beta.zip"))
            .expect("found");
        assert_eq!(found.name, "beta");
    }

    #[test]
    fn resolve_keeps_invalid_matches_and_inspects_outside_archives() {
        let temp = tempdir().expect("tempdir");
        let dir = temp.path().join("subs");
        fs::create_dir_all(&dir).expect("dir");
        write_zip(&dir.join("alpha.zip"), &[("config.json", MANIFEST)]);
        write_zip(&dir.join("broken.zip"), &[("main.c", "")]);
        let outside = temp.path().join("extra.zip");
        write_zip(&outside, &[("config.json", MANIFEST)]);

        let registry = discover_instances(&dir, false);
        assert_eq!(registry.resolve(&InstanceSelection::All).len(), 2);

        let named = registry.resolve(&InstanceSelection::Named(vec!["BROKEN".to_string()]));
        assert_eq!(named.len(), 1);
        assert!(!named[0].is_valid());

        let single = registry.resolve(&InstanceSelection::Archive(dir.join("alpha.zip")));
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].name, "alpha");

        let extra = registry.resolve(&InstanceSelection::Archive(outside));
        assert_eq!(extra[0].name, "extra");
        assert!(extra[0].is_valid());
    }

    #[test]
    fn missing_directory_yields_empty_registry() {
        let temp = tempdir().expect("tempdir");
        let registry = discover_instances(&temp.path().join("missing"), true);
        assert!(registry.instances.is_empty());
    }

    #[test]
    fn ignores_platform_noise() {
        assert!(is_ignored_entry("__MACOSX/proj/config.json"));
        assert!(is_ignored_entry("proj/.DS_Store"));
        assert!(is_ignored_entry("proj/"));
        assert!(!is_ignored_entry("proj/config.json"));
    }
}
