//! Extraction cache for submission archives.
//!
//! An instance is extracted into `<cache_root>/<safe name>_<fingerprint>/`.
//! A sidecar file beside the extracted tree records the source archive and
//! fingerprint; when both still match, extraction is skipped. The fingerprint
//! is derived from the archive's absolute path, size, and modification time.
//! It is a cheap cache key, not a content hash: two archives with identical
//! path, size, and mtime collide.
//!
//! Extraction is hardened against zip-slip: any entry whose path is absolute,
//! contains `..`, or resolves outside the workspace aborts the extraction.
//!
//! Two callers extracting the same fingerprint concurrently race on the same
//! directory. Single-run use never does this.

use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use super::archive::{CompilerInstance, is_ignored_entry, normalize_entry_name};

/// Sidecar written into each extracted workspace.
pub const SIDECAR_NAME: &str = ".archive_meta.json";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9A-Za-z._-]+").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Sidecar {
    archive_path: String,
    fingerprint: String,
    project_root: String,
    manifest_path: Option<String>,
}

/// A materialized instance workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Directory holding the extracted archive.
    pub workspace: PathBuf,
    /// Project root inside the workspace (the manifest's directory).
    pub project_root: PathBuf,
    pub fingerprint: String,
    /// True when an existing extraction was reused.
    pub reused: bool,
}

/// Cheap archive fingerprint: 12 hex chars over absolute path, size, mtime.
pub fn fingerprint(archive: &Path) -> Result<String> {
    let absolute =
        fs::canonicalize(archive).with_context(|| format!("resolve {}", archive.display()))?;
    let meta = fs::metadata(&absolute).with_context(|| format!("stat {}", absolute.display()))?;
    let mtime_ns = meta
        .modified()
        .ok()
        .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);
    let raw = format!("{}|{}|{}", absolute.display(), meta.len(), mtime_ns);
    let digest = Sha256::digest(raw.as_bytes());
    Ok(hex::encode(&digest[..6]))
}

/// Filesystem-safe rendering of an instance name.
pub fn safe_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "compiler".to_string();
    }
    UNSAFE_CHARS.replace_all(trimmed, "_").into_owned()
}

/// Extract an instance into `cache_root`, reusing a matching extraction.
///
/// A stale directory under the target name is purged before re-extracting.
/// On a path-escape attempt the partial workspace is removed and an error is
/// returned; the sidecar is only written after a complete extraction.
#[instrument(skip_all, fields(instance = %instance.name))]
pub fn extract_instance(instance: &CompilerInstance, cache_root: &Path) -> Result<Extraction> {
    fs::create_dir_all(cache_root)
        .with_context(|| format!("create cache dir {}", cache_root.display()))?;

    let fingerprint = fingerprint(&instance.archive)?;
    let archive_path = fs::canonicalize(&instance.archive)
        .with_context(|| format!("resolve {}", instance.archive.display()))?;
    let workspace = cache_root.join(format!("{}_{}", safe_name(&instance.name), fingerprint));
    let project_root = resolve_project_root(&workspace, &instance.project_root);

    if sidecar_matches(&workspace, &fingerprint, &archive_path) {
        info!(%fingerprint, workspace = %workspace.display(), "reusing extraction");
        return Ok(Extraction {
            workspace,
            project_root,
            fingerprint,
            reused: true,
        });
    }

    if workspace.exists() {
        debug!(workspace = %workspace.display(), "purging stale extraction");
        fs::remove_dir_all(&workspace)
            .with_context(|| format!("remove stale {}", workspace.display()))?;
    }
    fs::create_dir_all(&workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;

    let file = File::open(&archive_path)
        .with_context(|| format!("open {}", archive_path.display()))?;
    let extracted = ZipArchive::new(file)
        .context("read zip directory")
        .and_then(|mut archive| safe_extract_all(&mut archive, &workspace));
    let written = match extracted {
        Ok(written) => written,
        Err(err) => {
            if let Err(cleanup) = fs::remove_dir_all(&workspace) {
                warn!(workspace = %workspace.display(), error = %cleanup, "cleanup failed");
            }
            return Err(err.context(format!("extract {}", archive_path.display())));
        }
    };

    let sidecar = Sidecar {
        archive_path: archive_path.display().to_string(),
        fingerprint: fingerprint.clone(),
        project_root: instance.project_root.clone(),
        manifest_path: instance.manifest_path.clone(),
    };
    write_sidecar(&workspace.join(SIDECAR_NAME), &sidecar)?;
    info!(%fingerprint, files = written, workspace = %workspace.display(), "archive extracted");

    Ok(Extraction {
        workspace,
        project_root,
        fingerprint,
        reused: false,
    })
}

fn sidecar_matches(workspace: &Path, fingerprint: &str, archive_path: &Path) -> bool {
    let path = workspace.join(SIDECAR_NAME);
    let Ok(contents) = fs::read_to_string(&path) else {
        return false;
    };
    match serde_json::from_str::<Sidecar>(&contents) {
        Ok(sidecar) => {
            sidecar.fingerprint == fingerprint
                && sidecar.archive_path == archive_path.display().to_string()
        }
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring unreadable sidecar");
            false
        }
    }
}

fn write_sidecar(path: &Path, sidecar: &Sidecar) -> Result<()> {
    let contents = serde_json::to_string_pretty(sidecar).context("serialize sidecar")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write sidecar {}", path.display()))?;
    Ok(())
}

/// Project root inside a workspace; an empty subpath means the workspace itself.
pub fn resolve_project_root(workspace: &Path, project_root: &str) -> PathBuf {
    let normalized = normalize_entry_name(project_root);
    Path::new(normalized.trim_matches('/'))
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .fold(workspace.to_path_buf(), |root, part| root.join(part))
}

/// `C:` or `C:/...`; a colon elsewhere (`a:b.txt`) is an ordinary name.
fn has_drive_prefix(name: &str) -> bool {
    match name.as_bytes() {
        [letter, b':'] => letter.is_ascii_alphabetic(),
        [letter, b':', b'/' | b'\\', ..] => letter.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Validate an entry name and turn it into a workspace-relative path.
fn checked_relative_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() || path.has_root() || has_drive_prefix(name) {
        bail!("illegal archive path (absolute): {name}");
    }
    let mut relative = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("illegal archive path (escapes destination): {name}");
            }
        }
    }
    if relative.as_os_str().is_empty() {
        bail!("illegal archive path (empty): {name}");
    }
    Ok(relative)
}

/// Stream every non-ignored entry into `dest`, rejecting path escapes.
///
/// Returns the number of files written.
fn safe_extract_all<R: Read + Seek>(archive: &mut ZipArchive<R>, dest: &Path) -> Result<usize> {
    let dest = fs::canonicalize(dest).with_context(|| format!("resolve {}", dest.display()))?;
    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("read entry {index}"))?;
        let name = normalize_entry_name(entry.name());
        if is_ignored_entry(&name) {
            continue;
        }
        let relative = checked_relative_path(&name)?;
        let target = dest.join(&relative);
        let parent = target
            .parent()
            .ok_or_else(|| anyhow!("illegal archive path (no parent): {name}"))?;
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        let resolved_parent =
            fs::canonicalize(parent).with_context(|| format!("resolve {}", parent.display()))?;
        if !resolved_parent.starts_with(&dest) {
            bail!("illegal archive path (resolves outside destination): {name}");
        }
        let mut out =
            File::create(&target).with_context(|| format!("create {}", target.display()))?;
        io::copy(&mut entry, &mut out).with_context(|| format!("write {}", target.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Remove the whole extraction cache. Missing directories are fine.
pub fn clean_cache(cache_root: &Path) -> Result<bool> {
    if !cache_root.exists() {
        return Ok(false);
    }
    fs::remove_dir_all(cache_root)
        .with_context(|| format!("remove {}", cache_root.display()))?;
    Ok(true)
}
