//! Test helpers: a scratch git repository seeded with a small monorepo.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

/// Mapping config used by [`TestRepo::seeded`].
pub const FIXTURE_PACKAGE_MAP: &str = r#"{
  "OldPatterns": {
    "^lib/mapping\\.ts$": { "Repo": "new", "Package": "new", "Path": "src/mapping.ts" },
    "^lib/__tests__/test_fixtures\\.ts$": { "Repo": "new", "Package": "new", "Path": "test/test_fixtures.ts" },
    "^lib/(.*)$": { "Repo": "monorepo", "Package": "N/A", "Path": "lib/$1", "Order": 10 }
  }
}
"#;

/// Flat dependency graph matching [`FIXTURE_SOURCES`].
pub const FIXTURE_GRAPH: &str = r#"{
  "lib/index.ts": ["lib/git.ts", "lib/mapping.ts"],
  "lib/git.ts": ["lib/mapping.ts"],
  "lib/mapping.ts": [],
  "lib/__tests__/test_fixtures.ts": ["lib/mapping.ts"],
  "lib/__tests__/git.test.ts": ["lib/__tests__/test_fixtures.ts", "lib/git.ts"]
}
"#;

/// Source files of the seeded monorepo.
pub const FIXTURE_SOURCES: [(&str, &str); 5] = [
    (
        "lib/index.ts",
        "export * from \"./git\";\nexport { PackageMapping } from \"./mapping\";\n",
    ),
    (
        "lib/git.ts",
        "import { PackageMapping } from \"./mapping\";\n\nexport const git = (m: PackageMapping) => m;\n",
    ),
    ("lib/mapping.ts", "export class PackageMapping {}\n"),
    (
        "lib/__tests__/test_fixtures.ts",
        "import { PackageMapping } from \"../mapping\";\n\nexport const fixture = new PackageMapping();\n",
    ),
    (
        "lib/__tests__/git.test.ts",
        "import { fixture } from \"./test_fixtures\";\nimport { git } from \"../git\";\n\ngit(fixture);\n",
    ),
];

/// Temporary git repository. Its directory is named `monorepo` so the
/// default base repo name matches the fixture mapping.
pub struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Empty repository on branch `main` with one empty commit.
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let root = temp.path().join("monorepo");
        fs::create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;
        let repo = Self { _temp: temp, root };
        repo.git(&["init", "-q", "-b", "main"])?;
        repo.git(&["config", "user.name", "Splitter Test"])?;
        repo.git(&["config", "user.email", "splitter@example.com"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.git(&["commit", "-q", "--allow-empty", "-m", "init"])?;
        Ok(repo)
    }

    /// Repository holding the fixture sources, graph and mapping, committed.
    pub fn seeded() -> Result<Self> {
        let repo = Self::new()?;
        for (path, contents) in FIXTURE_SOURCES {
            repo.write(path, contents)?;
        }
        repo.write("doc/dependency.json", FIXTURE_GRAPH)?;
        repo.write("PackageMap.json", FIXTURE_PACKAGE_MAP)?;
        repo.commit_all("seed monorepo")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn write(&self, path: &str, contents: &str) -> Result<()> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&full, contents).with_context(|| format!("write {}", full.display()))
    }

    pub fn read(&self, path: &str) -> Result<String> {
        let full = self.root.join(path);
        fs::read_to_string(&full).with_context(|| format!("read {}", full.display()))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.root.join(path).exists()
    }

    pub fn commit_all(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])?;
        Ok(())
    }

    /// Run git in the repository and return trimmed stdout.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Files tracked at `reference`, sorted.
    pub fn tracked_files(&self, reference: &str) -> Result<Vec<String>> {
        let out = self.git(&["ls-tree", "-r", "--name-only", reference])?;
        let mut files: Vec<String> = out.lines().map(str::to_string).collect();
        files.sort();
        Ok(files)
    }

    /// Contents of `path` at `reference`.
    pub fn show(&self, reference: &str, path: &str) -> Result<String> {
        self.git(&["show", &format!("{reference}:{path}")])
    }
}
