//! TypeScript/JavaScript module provider for the import rewriter.
//!
//! [`TsProject`] scans source files with regexes instead of a full parser:
//! it only needs the module specifiers of `import` and `export ... from`
//! declarations and their byte spans.
//!
//! A project can be opened with relocations (current path -> original path)
//! so that, on a split branch where files already moved, specifiers are
//! still resolved against the layout they were written for.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::specifier::{
    dirname, ensure_relative_prefix, is_relative, join, normalize, standardize_slashes,
    strip_module_suffix,
};
use crate::io::settings::RewriteSettings;

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(?:type\s+)?[\w*${}\s,]*?[\s}]from\s*['"]([^'"\n]+)['"]"#)
        .expect("import regex")
});

static SIDE_EFFECT_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s*['"]([^'"\n]+)['"]"#).expect("side-effect import regex")
});

static EXPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export\s+(?:type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"]"#,
    )
    .expect("export-from regex")
});

static BLOCK_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex"));

/// Index of a module within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Import,
    ReExport,
}

/// One module-specifier-bearing declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub specifier: String,
    /// 1-based line of the specifier.
    pub line: usize,
    span: Range<usize>,
}

/// What the import rewriter needs from a module provider.
pub trait ModuleProject {
    /// Every source module, vendored code excluded.
    fn modules(&self) -> Vec<ModuleId>;

    /// Path the module had before the split (relative to the root).
    fn original_path(&self, module: ModuleId) -> &str;

    /// Path the module has in the working tree (relative to the root).
    fn current_path(&self, module: ModuleId) -> &str;

    /// Import and re-export declarations in source order.
    fn declarations(&self, module: ModuleId) -> Vec<Declaration>;

    /// Original path of the file a specifier refers to. `Ok(None)` for bare
    /// package specifiers, vendored targets and unknown files.
    fn resolve_specifier(&self, module: ModuleId, specifier: &str) -> Result<Option<String>>;

    /// Replace the specifier of the `index`-th declaration of `module`.
    fn set_specifier(&mut self, module: ModuleId, index: usize, specifier: &str) -> Result<()>;

    /// Module specifier from directory `from_dir` to `to_file`, or `None`
    /// when `from_dir` is not a directory of the project.
    fn relative_specifier(&self, from_dir: &str, to_file: &str) -> Option<String>;

    /// Files under the root that could not be loaded as modules.
    fn skipped(&self) -> &[String] {
        &[]
    }
}

#[derive(Debug, Clone)]
struct SourceModule {
    current: String,
    original: String,
    text: String,
    dirty: bool,
}

/// Regex-scanned TypeScript/JavaScript project.
#[derive(Debug, Clone)]
pub struct TsProject {
    root: PathBuf,
    modules: Vec<SourceModule>,
    vendor_dir: String,
    extensions: Vec<String>,
    /// Original paths resolvable as import targets.
    known: HashSet<String>,
    /// Current path -> original path, for every module.
    originals: HashMap<String, String>,
    directories: BTreeSet<String>,
    skipped: Vec<String>,
}

impl TsProject {
    /// Scan `root` for source files.
    ///
    /// `relocations` maps current paths to the paths files had before the
    /// split; `known_paths` adds original paths that may no longer exist in
    /// the working tree (files moved to other branches).
    #[instrument(skip_all, fields(root = %root.display()))]
    pub fn open<'a>(
        root: &Path,
        settings: &RewriteSettings,
        relocations: &HashMap<String, String>,
        known_paths: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        let mut files = Vec::new();
        let mut skipped = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                entry.depth() == 0 || (name != ".git" && name != settings.vendor_dir.as_str())
            });
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let has_extension = path
                .extension()
                .is_some_and(|ext| settings.extensions.iter().any(|e| ext == e.as_str()));
            if !has_extension {
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .with_context(|| format!("strip root from {}", path.display()))?;
            let relative = standardize_slashes(&relative.to_string_lossy());
            match fs::read_to_string(path) {
                Ok(text) => files.push((relative, text)),
                Err(err) => {
                    warn!(path = %relative, error = %err, "skipping unreadable module");
                    skipped.push(relative);
                }
            }
        }
        debug!(files = files.len(), skipped = skipped.len(), "scanned project");
        let mut project = Self::from_sources(root, settings, files, relocations, known_paths);
        project.skipped = skipped;
        Ok(project)
    }

    /// Build a project from in-memory sources (paths relative to `root`).
    pub fn from_sources<'a>(
        root: &Path,
        settings: &RewriteSettings,
        files: Vec<(String, String)>,
        relocations: &HashMap<String, String>,
        known_paths: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let vendor_dir = settings.vendor_dir.clone();
        let modules: Vec<SourceModule> = files
            .into_iter()
            .map(|(path, text)| (normalize(&path), text))
            .filter(|(path, _)| !in_vendor_dir(path, &vendor_dir))
            .map(|(current, text)| {
                let original = relocations
                    .get(&current)
                    .map_or_else(|| current.clone(), |orig| normalize(orig));
                SourceModule {
                    current,
                    original,
                    text,
                    dirty: false,
                }
            })
            .collect();

        let mut known: HashSet<String> = known_paths.into_iter().map(normalize).collect();
        known.extend(modules.iter().map(|m| m.original.clone()));
        let originals = modules
            .iter()
            .map(|m| (m.current.clone(), m.original.clone()))
            .collect();
        let mut directories = BTreeSet::new();
        for module in &modules {
            let mut dir = dirname(&module.current);
            loop {
                if !directories.insert(dir.clone()) || dir.is_empty() {
                    break;
                }
                dir = dirname(&dir);
            }
        }
        directories.insert(String::new());

        Self {
            root: root.to_path_buf(),
            modules,
            vendor_dir,
            extensions: settings.extensions.clone(),
            known,
            originals,
            directories,
            skipped: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module at `current_path`, if the project has one.
    pub fn find(&self, current_path: &str) -> Option<ModuleId> {
        let wanted = normalize(current_path);
        self.modules
            .iter()
            .position(|m| m.current == wanted)
            .map(ModuleId)
    }

    pub fn text(&self, module: ModuleId) -> &str {
        &self.modules[module.0].text
    }

    /// Current paths of modules with unsaved edits.
    pub fn modified_paths(&self) -> Vec<String> {
        self.modules
            .iter()
            .filter(|m| m.dirty)
            .map(|m| m.current.clone())
            .collect()
    }

    /// Write every modified module back under the root.
    #[instrument(skip_all)]
    pub fn save(&mut self) -> Result<Vec<String>> {
        let mut saved = Vec::new();
        for module in self.modules.iter_mut().filter(|m| m.dirty) {
            let path = self.root.join(&module.current);
            fs::write(&path, &module.text)
                .with_context(|| format!("write {}", path.display()))?;
            module.dirty = false;
            saved.push(module.current.clone());
        }
        debug!(saved = saved.len(), "saved modified modules");
        Ok(saved)
    }

    /// First existing file a resolved base path refers to, trying the path
    /// itself, known extensions, `index` files, and TypeScript sources for
    /// ESM-style `.js` specifiers.
    fn lookup(&self, base: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
        let mut candidates = vec![base.to_string()];
        for (js, ts) in [(".js", ".ts"), (".jsx", ".tsx"), (".mjs", ".mts"), (".cjs", ".cts")] {
            if let Some(stem) = base.strip_suffix(js) {
                candidates.push(format!("{stem}{ts}"));
            }
        }
        let with_dts = self
            .extensions
            .iter()
            .map(String::as_str)
            .chain(std::iter::once("d.ts"));
        for ext in with_dts.clone() {
            candidates.push(format!("{base}.{ext}"));
        }
        for ext in with_dts {
            candidates.push(join(base, &format!("index.{ext}")));
        }
        candidates.into_iter().find(|candidate| exists(candidate))
    }
}

fn in_vendor_dir(path: &str, vendor_dir: &str) -> bool {
    path.split('/').any(|segment| segment == vendor_dir)
}

fn scan_declarations(text: &str) -> Vec<Declaration> {
    let comments: Vec<Range<usize>> = BLOCK_COMMENT_RE.find_iter(text).map(|m| m.range()).collect();
    let mut found: Vec<(DeclarationKind, Range<usize>)> = Vec::new();
    for re in [&*IMPORT_RE, &*SIDE_EFFECT_IMPORT_RE] {
        found.extend(
            re.captures_iter(text)
                .filter_map(|caps| caps.get(1))
                .map(|m| (DeclarationKind::Import, m.range())),
        );
    }
    found.extend(
        EXPORT_FROM_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| (DeclarationKind::ReExport, m.range())),
    );
    found.retain(|(_, span)| !comments.iter().any(|c| c.contains(&span.start)));
    found.sort_by_key(|(_, span)| span.start);
    found.dedup_by_key(|(_, span)| span.start);
    found
        .into_iter()
        .map(|(kind, span)| Declaration {
            kind,
            specifier: text[span.clone()].to_string(),
            line: text[..span.start].matches('\n').count() + 1,
            span,
        })
        .collect()
}

impl ModuleProject for TsProject {
    fn modules(&self) -> Vec<ModuleId> {
        (0..self.modules.len()).map(ModuleId).collect()
    }

    fn original_path(&self, module: ModuleId) -> &str {
        &self.modules[module.0].original
    }

    fn current_path(&self, module: ModuleId) -> &str {
        &self.modules[module.0].current
    }

    fn declarations(&self, module: ModuleId) -> Vec<Declaration> {
        scan_declarations(&self.modules[module.0].text)
    }

    fn resolve_specifier(&self, module: ModuleId, specifier: &str) -> Result<Option<String>> {
        if !is_relative(specifier) {
            return Ok(None);
        }
        let source = &self.modules[module.0];
        let base = join(&dirname(&source.original), specifier);
        if base.starts_with("..") {
            bail!(
                "specifier '{specifier}' in {} escapes the project root",
                source.current
            );
        }
        if in_vendor_dir(&base, &self.vendor_dir) {
            return Ok(None);
        }
        if let Some(found) = self.lookup(&base, |p| self.known.contains(p)) {
            return Ok(Some(found));
        }
        // Already rewritten for the current layout.
        let current_base = join(&dirname(&source.current), specifier);
        Ok(self
            .lookup(&current_base, |p| self.originals.contains_key(p))
            .and_then(|current| self.originals.get(&current).cloned()))
    }

    fn set_specifier(&mut self, module: ModuleId, index: usize, specifier: &str) -> Result<()> {
        let source = self
            .modules
            .get_mut(module.0)
            .ok_or_else(|| anyhow!("unknown module {}", module.0))?;
        let declarations = scan_declarations(&source.text);
        let declaration = declarations.get(index).ok_or_else(|| {
            anyhow!(
                "{} has no declaration #{index} ({} found)",
                source.current,
                declarations.len()
            )
        })?;
        source.text.replace_range(declaration.span.clone(), specifier);
        source.dirty = true;
        Ok(())
    }

    fn relative_specifier(&self, from_dir: &str, to_file: &str) -> Option<String> {
        let from_dir = normalize(from_dir);
        if !self.directories.contains(&from_dir) {
            return None;
        }
        let base = Path::new("/");
        let target = base.join(strip_module_suffix(&normalize(to_file)));
        let relative = pathdiff::diff_paths(target, base.join(&from_dir))?;
        Some(ensure_relative_prefix(&standardize_slashes(
            &relative.to_string_lossy(),
        )))
    }
}
