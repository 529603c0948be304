//! Git adapter for the split.
//!
//! The orchestrator only talks to version control through [`Vcs`], so tests
//! can swap in a scripted backend. [`Git`] is the real one: a small, explicit
//! wrapper around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Paths passed per `git rm`/`git check-ignore` invocation.
const PATH_CHUNK: usize = 200;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Version-control operations the split needs.
pub trait Vcs {
    fn workdir(&self) -> &Path;

    /// True when the working directory is inside a git working tree.
    fn check_is_repo(&self) -> Result<bool>;

    /// Changed and untracked files (ignored files are not reported).
    fn status(&self) -> Result<Vec<StatusEntry>>;

    /// Create and check out `branch` at the current HEAD.
    fn checkout_local_branch(&self, branch: &str) -> Result<()>;

    fn checkout(&self, reference: &str) -> Result<()>;

    /// Local branch names matching a `git branch --list` pattern.
    fn list_branches(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove paths from the index and the working tree.
    fn rm(&self, paths: &[String]) -> Result<()>;

    fn mv(&self, old_path: &str, new_path: &str) -> Result<()>;

    fn add(&self, paths: &[String]) -> Result<()>;

    /// Commit staged changes. Returns `false` without committing when
    /// nothing is staged.
    fn commit(&self, message: &str) -> Result<bool>;

    /// The subset of `paths` matched by ignore rules.
    fn check_ignore(&self, paths: &[String]) -> Result<Vec<String>>;

    fn rev_parse(&self, args: &[&str]) -> Result<String>;

    /// Current branch name, or `None` on a detached HEAD.
    fn current_branch(&self) -> Result<Option<String>> {
        let name = self.rev_parse(&["--abbrev-ref", "HEAD"])?;
        Ok((name != "HEAD").then_some(name))
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }

    fn run_with_paths(&self, args: &[&str], paths: &[String]) -> Result<Vec<Output>> {
        paths
            .chunks(PATH_CHUNK)
            .map(|chunk| {
                let mut full: Vec<&str> = args.to_vec();
                full.push("--");
                full.extend(chunk.iter().map(String::as_str));
                self.run(&full)
            })
            .collect()
    }
}

impl Vcs for Git {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn check_is_repo(&self) -> Result<bool> {
        let out = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        Ok(out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
    }

    fn status(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    #[instrument(skip_all, fields(branch))]
    fn checkout_local_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    #[instrument(skip_all, fields(reference))]
    fn checkout(&self, reference: &str) -> Result<()> {
        debug!(reference, "checking out");
        self.run_checked(&["checkout", reference])?;
        Ok(())
    }

    fn list_branches(&self, pattern: &str) -> Result<Vec<String>> {
        let out = self.run_capture(&["branch", "--list", pattern, "--format=%(refname:short)"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    #[instrument(skip_all, fields(count = paths.len()))]
    fn rm(&self, paths: &[String]) -> Result<()> {
        for output in self.run_with_paths(&["rm", "-r", "-q", "--ignore-unmatch"], paths)? {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(anyhow!("git rm failed: {}", stderr.trim()));
            }
        }
        Ok(())
    }

    fn mv(&self, old_path: &str, new_path: &str) -> Result<()> {
        debug!(old_path, new_path, "git mv");
        self.run_checked(&["mv", "--", old_path, new_path])?;
        Ok(())
    }

    fn add(&self, paths: &[String]) -> Result<()> {
        for output in self.run_with_paths(&["add"], paths)? {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(anyhow!("git add failed: {}", stderr.trim()));
            }
        }
        Ok(())
    }

    #[instrument(skip_all)]
    fn commit(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!(message, "committing staged changes");
        self.run_checked(&["commit", "-q", "-m", message])?;
        Ok(true)
    }

    fn check_ignore(&self, paths: &[String]) -> Result<Vec<String>> {
        let mut ignored = Vec::new();
        for output in self.run_with_paths(&["check-ignore"], paths)? {
            // Exit 1 means none of the paths are ignored.
            match output.status.code() {
                Some(0) | Some(1) => {}
                _ => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(stderr = %stderr.trim(), "git check-ignore failed");
                    return Err(anyhow!("git check-ignore failed: {}", stderr.trim()));
                }
            }
            ignored.extend(
                String::from_utf8_lossy(&output.stdout)
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(ignored)
    }

    fn rev_parse(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["rev-parse"];
        full.extend_from_slice(args);
        Ok(self.run_capture(&full)?.trim().to_string())
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}
