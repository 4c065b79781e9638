//! Grader configuration stored in `grader.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Grader configuration (TOML).
///
/// Missing fields default to values suited to a single-machine grading run.
/// Relative paths are resolved against the directory holding the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GraderConfig {
    pub parallel: ParallelConfig,
    pub paths: PathsConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParallelConfig {
    /// Worker budget shared by the compile and test phases.
    pub max_workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory scanned for submission archives.
    pub archives_dir: PathBuf,
    /// Root of the test suites.
    pub testcases_dir: PathBuf,
    /// Extraction cache.
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            archives_dir: PathBuf::from("submissions"),
            testcases_dir: PathBuf::from("testcases"),
            cache_dir: PathBuf::from(".tmp/zip_sources"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Scan nested directories for archives (e.g. one folder per class).
    pub recursive: bool,
}

impl GraderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.parallel.max_workers == 0 {
            return Err(anyhow!("parallel.max_workers must be > 0"));
        }
        for (label, path) in [
            ("paths.archives_dir", &self.paths.archives_dir),
            ("paths.testcases_dir", &self.paths.testcases_dir),
            ("paths.cache_dir", &self.paths.cache_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("{label} must be non-empty"));
            }
        }
        Ok(())
    }

    /// Rebase relative paths onto `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        for path in [
            &mut self.paths.archives_dir,
            &mut self.paths.testcases_dir,
            &mut self.paths.cache_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `GraderConfig::default()`. Relative paths
/// are resolved against the file's directory either way.
pub fn load_config(path: &Path) -> Result<GraderConfig> {
    let base = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if !path.exists() {
        let cfg = GraderConfig::default();
        cfg.validate()?;
        return Ok(cfg.resolve_paths(base));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: GraderConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg.resolve_paths(base))
}

const CONFIG_HEADER: &str =
    "# Grader configuration. Relative paths resolve against this file's directory.\n\n";

/// Write `cfg` to `path`, replacing any existing file with a single rename.
pub fn write_config(path: &Path, cfg: &GraderConfig) -> Result<()> {
    cfg.validate()?;
    let body = toml::to_string_pretty(cfg).context("serialize config toml")?;
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("config path has no file name: {}", path.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let staged = dir.join(format!(".{}.partial", file_name.to_string_lossy()));
    fs::write(&staged, format!("{CONFIG_HEADER}{body}"))
        .with_context(|| format!("write {}", staged.display()))?;
    fs::rename(&staged, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// Write the default config to `path`. An existing file is kept unless
/// `force` is set. Returns whether a file was written.
pub fn init_config(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    write_config(path, &GraderConfig::default())?;
    Ok(true)
}
