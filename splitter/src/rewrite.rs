//! Import rewriting: recompute module specifiers for the mapped layout.
//!
//! Intra-package imports keep a relative specifier recomputed from the
//! importer's new directory. Cross-package imports become the bare
//! destination package name.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::core::location::{Location, NOT_APPLICABLE};
use crate::core::mapping::PackageMapping;
use crate::core::specifier::{dirname, ensure_relative_prefix, is_relative, relative_module_specifier};
use crate::io::project::{DeclarationKind, ModuleId, ModuleProject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteKind {
    IntraPackage,
    CrossPackage,
}

/// One changed specifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecifierRewrite {
    pub module: String,
    pub line: usize,
    pub from: String,
    pub to: String,
    pub kind: RewriteKind,
}

/// Result of one rewrite pass. Edits live in the project until saved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    /// Current paths of modules with at least one rewrite.
    pub modified: BTreeSet<String>,
    pub rewrites: Vec<SpecifierRewrite>,
    /// Declarations skipped because of a resolution or edit error.
    pub errors: usize,
    /// Files the project could not load, left untouched.
    pub skipped: Vec<String>,
}

impl RewriteReport {
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }
}

/// Rewrite every import and relative re-export of `project` for `mapping`.
///
/// Errors on a single declaration are logged and counted; the pass goes on.
#[instrument(skip_all)]
pub fn rewrite_imports<P: ModuleProject>(project: &mut P, mapping: &PackageMapping) -> RewriteReport {
    let mut report = RewriteReport {
        skipped: project.skipped().to_vec(),
        ..RewriteReport::default()
    };
    for module in project.modules() {
        let original = project.original_path(module).to_string();
        let mapped_source = mapping.map_package(&original);
        for (index, declaration) in project.declarations(module).into_iter().enumerate() {
            if declaration.kind == DeclarationKind::ReExport && !is_relative(&declaration.specifier) {
                continue;
            }
            let current = project.current_path(module).to_string();
            let target = match project.resolve_specifier(module, &declaration.specifier) {
                Ok(Some(target)) => target,
                Ok(None) => continue,
                Err(err) => {
                    error!(module = %current, line = declaration.line, error = %format!("{err:#}"), "cannot resolve specifier");
                    report.errors += 1;
                    continue;
                }
            };
            let Some(mapped_target) = mapping.map_package(&target) else {
                continue;
            };
            let (new_specifier, kind) = if is_same_package(mapped_source.as_ref(), &mapped_target) {
                let specifier = source_file_relative_mapped_path(
                    &*project,
                    module,
                    mapped_source.as_ref(),
                    &mapped_target,
                );
                (specifier, RewriteKind::IntraPackage)
            } else {
                (mapped_target.package.clone(), RewriteKind::CrossPackage)
            };
            if new_specifier == declaration.specifier {
                continue;
            }
            if let Err(err) = project.set_specifier(module, index, &new_specifier) {
                error!(module = %current, line = declaration.line, error = %format!("{err:#}"), "cannot rewrite specifier");
                report.errors += 1;
                continue;
            }
            debug!(
                module = %current,
                line = declaration.line,
                from = %declaration.specifier,
                to = %new_specifier,
                target = %target,
                "rewrote specifier"
            );
            report.modified.insert(current.clone());
            report.rewrites.push(SpecifierRewrite {
                module: current,
                line: declaration.line,
                from: declaration.specifier,
                to: new_specifier,
                kind,
            });
        }
    }
    info!(
        modules = report.modified.len(),
        rewrites = report.rewrites.len(),
        errors = report.errors,
        skipped = report.skipped.len(),
        "import rewrite finished"
    );
    report
}

/// A target whose package is `N/A` stays local to its importer.
fn is_same_package(source: Option<&Location>, target: &Location) -> bool {
    target.package == NOT_APPLICABLE || source.is_some_and(|s| s.package == target.package)
}

/// Relative specifier from the importer to `mapped_target`.
///
/// With a mapped source the specifier starts at the source's new directory;
/// without one it starts where the module currently is. The project's
/// directory lookup is preferred and plain path arithmetic is the fallback.
pub fn source_file_relative_mapped_path<P: ModuleProject + ?Sized>(
    project: &P,
    module: ModuleId,
    mapped_source: Option<&Location>,
    mapped_target: &Location,
) -> String {
    let from_dir = match mapped_source {
        Some(source) => dirname(&source.path),
        None => dirname(project.current_path(module)),
    };
    let specifier = project
        .relative_specifier(&from_dir, &mapped_target.path)
        .unwrap_or_else(|| relative_module_specifier(&from_dir, &mapped_target.path));
    ensure_relative_prefix(&specifier)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use super::*;
    use crate::core::graph::DependencyGraph;
    use crate::core::mapping::MappingConfig;
    use crate::io::project::TsProject;
    use crate::io::settings::RewriteSettings;

    fn mapping() -> PackageMapping {
        let config = MappingConfig::from_rules([
            ("^lib/mapping\\.ts$", Location::new("new", "new", "src/mapping.ts")),
            ("^lib/helpers\\.ts$", Location::new("new", "new", "src/util/helpers.ts")),
            (
                "^lib/__tests__/test_fixtures\\.ts$",
                Location::new("test_fixtures", "test_fixtures", "lib/package/test_fixtures/__tests__/test_fixtures.ts"),
            ),
            (
                "^lib/(.*)$",
                Location {
                    order: Some(10),
                    ..Location::new("ts-morph-split-packages", NOT_APPLICABLE, "lib/$1")
                },
            ),
        ])
        .expect("config");
        let graph = DependencyGraph::from_edges([
            ("lib/index.ts", vec!["lib/mapping.ts", "lib/git.ts"]),
            ("lib/mapping.ts", vec!["lib/helpers.ts"]),
            ("lib/helpers.ts", vec![]),
            ("lib/git.ts", vec!["lib/mapping.ts"]),
            ("lib/__tests__/test_fixtures.ts", vec!["lib/index.ts"]),
        ]);
        PackageMapping::new(config, &graph)
    }

    fn project(files: &[(&str, &str)], relocations: &[(&str, &str)], mapping: &PackageMapping) -> TsProject {
        let relocations: HashMap<String, String> = relocations
            .iter()
            .map(|(current, original)| (current.to_string(), original.to_string()))
            .collect();
        TsProject::from_sources(
            Path::new("/repo"),
            &RewriteSettings::default(),
            files
                .iter()
                .map(|(path, text)| (path.to_string(), text.to_string()))
                .collect(),
            &relocations,
            mapping.old_names(),
        )
    }

    #[test]
    fn cross_package_import_becomes_bare_package() {
        let mapping = mapping();
        let mut p = project(
            &[
                ("lib/index.ts", "import { PackageMapping } from \"./mapping\";\nexport * from \"./git\";\n"),
                ("lib/git.ts", ""),
            ],
            &[],
            &mapping,
        );
        let report = rewrite_imports(&mut p, &mapping);
        let index = p.find("lib/index.ts").expect("module");
        assert_eq!(
            p.text(index),
            "import { PackageMapping } from \"new\";\nexport * from \"./git\";\n"
        );
        assert_eq!(report.rewrites.len(), 1);
        assert_eq!(report.rewrites[0].kind, RewriteKind::CrossPackage);
        assert_eq!(report.rewrites[0].line, 1);
        assert_eq!(report.modified, BTreeSet::from(["lib/index.ts".to_string()]));
        assert_eq!(report.errors, 0);
    }

    #[test]
    fn intra_package_import_is_recomputed_from_new_directory() {
        let mapping = mapping();
        let mut p = project(
            &[
                ("src/mapping.ts", "import { h } from \"./helpers\";\n"),
                ("src/util/helpers.ts", ""),
            ],
            &[
                ("src/mapping.ts", "lib/mapping.ts"),
                ("src/util/helpers.ts", "lib/helpers.ts"),
            ],
            &mapping,
        );
        let report = rewrite_imports(&mut p, &mapping);
        let module = p.find("src/mapping.ts").expect("module");
        assert_eq!(p.text(module), "import { h } from \"./util/helpers\";\n");
        assert_eq!(report.rewrites[0].kind, RewriteKind::IntraPackage);
    }

    #[test]
    fn rerun_is_idempotent() {
        let mapping = mapping();
        let mut p = project(
            &[
                ("src/mapping.ts", "import { h } from \"./helpers\";\n"),
                ("src/util/helpers.ts", ""),
            ],
            &[
                ("src/mapping.ts", "lib/mapping.ts"),
                ("src/util/helpers.ts", "lib/helpers.ts"),
            ],
            &mapping,
        );
        let first = rewrite_imports(&mut p, &mapping);
        assert_eq!(first.rewrites.len(), 1);
        let second = rewrite_imports(&mut p, &mapping);
        assert!(second.is_empty());
        assert_eq!(second.errors, 0);
    }

    #[test]
    fn sentinel_package_target_stays_relative() {
        let mapping = mapping();
        let mut p = project(
            &[
                (
                    "lib/package/test_fixtures/__tests__/test_fixtures.ts",
                    "import { PackageMapping } from \"..\";\n",
                ),
                ("lib/index.ts", ""),
            ],
            &[(
                "lib/package/test_fixtures/__tests__/test_fixtures.ts",
                "lib/__tests__/test_fixtures.ts",
            )],
            &mapping,
        );
        rewrite_imports(&mut p, &mapping);
        let module = p
            .find("lib/package/test_fixtures/__tests__/test_fixtures.ts")
            .expect("module");
        assert_eq!(p.text(module), "import { PackageMapping } from \"../../..\";\n");
    }

    #[test]
    fn unchanged_specifier_is_not_recorded() {
        let mapping = mapping();
        let mut p = project(
            &[("lib/git.ts", ""), ("lib/index.ts", "import * as git from \"./git\";\n")],
            &[],
            &mapping,
        );
        let report = rewrite_imports(&mut p, &mapping);
        assert!(report.is_empty());
        assert!(p.modified_paths().is_empty());
    }

    #[test]
    fn unmapped_and_bare_targets_are_left_alone() {
        let mapping = mapping();
        let mut p = project(
            &[
                ("tools/build.ts", "import x from \"lodash\";\nimport { y } from \"./local\";\n"),
                ("tools/local.ts", ""),
            ],
            &[],
            &mapping,
        );
        let report = rewrite_imports(&mut p, &mapping);
        assert!(report.is_empty());
    }

    #[test]
    fn resolution_errors_are_counted_not_fatal() {
        let mapping = mapping();
        let mut p = project(
            &[(
                "lib/index.ts",
                "import a from \"../../nowhere\";\nimport { m } from \"./mapping\";\n",
            )],
            &[],
            &mapping,
        );
        let report = rewrite_imports(&mut p, &mapping);
        assert_eq!(report.errors, 1);
        assert_eq!(report.rewrites.len(), 1);
        assert_eq!(report.rewrites[0].to, "new");
    }

    #[test]
    fn unreadable_files_are_reported_and_the_rest_rewritten() {
        let mapping = mapping();
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        std::fs::create_dir_all(root.join("lib")).expect("mkdir");
        std::fs::write(root.join("lib/index.ts"), "import { m } from \"./mapping\";\n").expect("write");
        std::fs::write(root.join("lib/mapping.ts"), "").expect("write");
        std::fs::write(root.join("lib/legacy.js"), b"var \xff\xfe\n").expect("write");

        let mut p = TsProject::open(root, &RewriteSettings::default(), &HashMap::new(), mapping.old_names())
            .expect("open");
        let report = rewrite_imports(&mut p, &mapping);
        assert_eq!(report.skipped, vec!["lib/legacy.js"]);
        assert_eq!(report.rewrites.len(), 1);
        assert_eq!(report.rewrites[0].to, "new");
    }

    #[test]
    fn relative_path_from_unmapped_source_uses_current_location() {
        let mapping = mapping();
        let p = project(&[("tools/x.ts", "")], &[], &mapping);
        let module = p.find("tools/x.ts").expect("module");
        let target = Location::new("new", "new", "src/mapping.ts");
        assert_eq!(
            source_file_relative_mapped_path(&p, module, None, &target),
            "../src/mapping"
        );
    }

    #[test]
    fn relative_path_falls_back_to_arithmetic() {
        let mapping = mapping();
        let p = project(&[("lib/index.ts", "")], &[], &mapping);
        let module = p.find("lib/index.ts").expect("module");
        let source = Location::new("new", "new", "lib/package/base/__tests__/git.test.ts");
        let target = Location::new("new", "new", "lib/package/base/git.ts");
        assert_eq!(
            source_file_relative_mapped_path(&p, module, Some(&source), &target),
            "../git"
        );
        let source = Location::new("r", "p", "lib/index.ts");
        let target = Location::new("r", "p", "lib/git.ts");
        assert_eq!(
            source_file_relative_mapped_path(&p, module, Some(&source), &target),
            "./git"
        );
    }
}
