//! Splitter settings stored in `split.toml` at the repository root.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const SETTINGS_FILE: &str = "split.toml";

/// Splitter settings (TOML).
///
/// Paths are relative to the repository root. Missing fields default to the
/// conventional locations of the graph and mapping files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SplitSettings {
    /// Precomputed dependency graph (madge or dependency-cruiser JSON).
    pub dependency_graph: PathBuf,

    /// Mapping config (`OldPatterns`).
    pub package_map: PathBuf,

    /// Name of the repository being split; files mapped to it or to `N/A`
    /// stay on its base branch. Defaults to the root directory name.
    pub base_repo: Option<String>,

    /// Overrides the mapping config's branch prefix.
    pub branch_prefix: Option<String>,

    pub rewrite: RewriteSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RewriteSettings {
    /// Third-party directory never scanned or rewritten.
    pub vendor_dir: String,

    /// Source file extensions considered modules.
    pub extensions: Vec<String>,

    /// Commit message for rewritten imports; `{repo}` is replaced.
    pub commit_message: String,
}

impl Default for RewriteSettings {
    fn default() -> Self {
        Self {
            vendor_dir: "node_modules".to_string(),
            extensions: ["ts", "tsx", "js", "jsx", "mjs", "cjs"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            commit_message: "Rewrite imports for {repo}".to_string(),
        }
    }
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            dependency_graph: PathBuf::from("doc/dependency.json"),
            package_map: PathBuf::from("PackageMap.json"),
            base_repo: None,
            branch_prefix: None,
            rewrite: RewriteSettings::default(),
        }
    }
}

impl SplitSettings {
    pub fn validate(&self) -> Result<()> {
        if self.dependency_graph.as_os_str().is_empty() {
            return Err(anyhow!("dependency_graph must not be empty"));
        }
        if self.package_map.as_os_str().is_empty() {
            return Err(anyhow!("package_map must not be empty"));
        }
        if self.base_repo.as_deref().is_some_and(|r| r.trim().is_empty()) {
            return Err(anyhow!("base_repo must not be blank"));
        }
        if self.branch_prefix.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(anyhow!("branch_prefix must not be blank"));
        }
        if self.rewrite.vendor_dir.trim().is_empty() {
            return Err(anyhow!("rewrite.vendor_dir must not be empty"));
        }
        if self.rewrite.extensions.is_empty()
            || self.rewrite.extensions.iter().any(|e| e.trim().is_empty())
        {
            return Err(anyhow!("rewrite.extensions must be a non-empty array"));
        }
        Ok(())
    }

    /// Base repo name: the configured one, else the name of `root`.
    pub fn base_repo_for(&self, root: &Path) -> Result<String> {
        if let Some(name) = &self.base_repo {
            return Ok(name.clone());
        }
        let canonical = root
            .canonicalize()
            .with_context(|| format!("resolve {}", root.display()))?;
        canonical
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| anyhow!("cannot derive base repo name from {}", root.display()))
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `SplitSettings::default()`.
pub fn load_settings(path: &Path) -> Result<SplitSettings> {
    if !path.exists() {
        let settings = SplitSettings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: SplitSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &SplitSettings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize settings toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("settings path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp settings {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace settings {}", path.display()))?;
    Ok(())
}
