//! Split phases as typed records.
//!
//! `SplitSession` -> `GraphPhase` -> `MapPhase` -> `MovePhase` ->
//! `RewritePhase`. Each transition consumes the previous record, so a phase
//! cannot be skipped or repeated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, instrument};

use crate::core::graph::{DependencyGraph, GraphFilter};
use crate::core::mapping::PackageMapping;
use crate::core::plan::{FileMove, MovePlan, base_moves, prepare_git_move, with_all_destinations};
use crate::error::MoveOutcome;
use crate::io::git::Vcs;
use crate::io::inputs::{load_dependency_graph, load_mapping_config};
use crate::io::project::TsProject;
use crate::io::settings::SplitSettings;
use crate::rewrite::{RewriteReport, rewrite_imports};
use crate::split::GitSplitter;

/// Initial phase: where to work and with which settings.
#[derive(Debug, Clone)]
pub struct SplitSession {
    root: PathBuf,
    settings: SplitSettings,
    base_repo: String,
}

impl SplitSession {
    pub fn new(root: impl Into<PathBuf>, settings: SplitSettings) -> Result<Self> {
        let root = root.into();
        settings.validate()?;
        let base_repo = settings.base_repo_for(&root)?;
        Ok(Self {
            root,
            settings,
            base_repo,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> &SplitSettings {
        &self.settings
    }

    pub fn base_repo(&self) -> &str {
        &self.base_repo
    }

    fn graph_filter(&self) -> GraphFilter {
        GraphFilter {
            vendor_dir: self.settings.rewrite.vendor_dir.clone(),
            ..GraphFilter::default()
        }
    }

    /// Load the precomputed dependency graph.
    #[instrument(skip_all)]
    pub fn build_dependency_graph(self) -> Result<GraphPhase> {
        let path = self.root.join(&self.settings.dependency_graph);
        let graph = load_dependency_graph(&path, &self.graph_filter())?;
        info!(nodes = graph.len(), "dependency graph loaded");
        Ok(GraphPhase {
            session: self,
            graph,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GraphPhase {
    session: SplitSession,
    graph: DependencyGraph,
}

impl GraphPhase {
    /// Load the mapping config and classify every graph node.
    #[instrument(skip_all)]
    pub fn map(self) -> Result<MapPhase> {
        let settings = &self.session.settings;
        let mut config = load_mapping_config(&self.session.root.join(&settings.package_map))?;
        if let Some(prefix) = &settings.branch_prefix {
            config = config.with_branch_prefix(prefix.clone());
        }
        let mapping = PackageMapping::new(config, &self.graph);
        let mapped = mapping.dep_map().iter().filter(|e| e.name.is_mapped()).count();
        info!(mapped, total = mapping.dep_map().len(), "mapping built");
        Ok(MapPhase {
            session: self.session,
            mapping,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MapPhase {
    session: SplitSession,
    mapping: PackageMapping,
}

impl MapPhase {
    pub fn session(&self) -> &SplitSession {
        &self.session
    }

    pub fn mapping(&self) -> &PackageMapping {
        &self.mapping
    }

    /// Destination repo -> moves, one entry per destination branch.
    pub fn plan(&self) -> MovePlan {
        let base = self.session.base_repo();
        with_all_destinations(prepare_git_move(&self.mapping, base), &self.mapping, base)
    }

    /// Run the git split. The base branch is left checked out.
    #[instrument(skip_all)]
    pub fn split<V: Vcs>(self, vcs: &V) -> Result<MovePhase> {
        let plan = self.plan();
        let outcomes = GitSplitter::new(vcs, &self.mapping, self.session.base_repo())
            .execute_for_repos(&plan)?;
        Ok(MovePhase {
            session: self.session,
            mapping: self.mapping,
            plan,
            outcomes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MovePhase {
    session: SplitSession,
    mapping: PackageMapping,
    plan: MovePlan,
    outcomes: Vec<MoveOutcome>,
}

impl MovePhase {
    pub fn outcomes(&self) -> &[MoveOutcome] {
        &self.outcomes
    }

    /// Rewrite imports on every split branch and commit the result. The
    /// base branch is processed last and stays checked out.
    #[instrument(skip_all)]
    pub fn rewrite<V: Vcs>(self, vcs: &V) -> Result<RewritePhase> {
        let base = self.session.base_repo().to_string();
        let mut branches: Vec<(String, Vec<FileMove>)> = self
            .plan
            .iter()
            .map(|(repo, moves)| (repo.clone(), moves.clone()))
            .collect();
        branches.push((base.clone(), base_moves(&self.mapping, &base)));

        let mut reports = IndexMap::new();
        for (repo, moves) in branches {
            let branch = self.mapping.config().branch_name(&repo);
            vcs.checkout(&branch)
                .with_context(|| format!("checkout {branch}"))?;
            let report = rewrite_branch(&self.session, &self.mapping, &repo, &moves, vcs)?;
            reports.insert(repo, report);
        }
        Ok(RewritePhase {
            outcomes: self.outcomes,
            reports,
        })
    }
}

/// Final phase record.
#[derive(Debug, Clone, Serialize)]
pub struct RewritePhase {
    outcomes: Vec<MoveOutcome>,
    reports: IndexMap<String, RewriteReport>,
}

impl RewritePhase {
    pub fn outcomes(&self) -> &[MoveOutcome] {
        &self.outcomes
    }

    pub fn reports(&self) -> &IndexMap<String, RewriteReport> {
        &self.reports
    }
}

/// Rewrite the checked-out split branch of `repo` and commit the edits.
fn rewrite_branch<V: Vcs>(
    session: &SplitSession,
    mapping: &PackageMapping,
    repo: &str,
    moves: &[FileMove],
    vcs: &V,
) -> Result<RewriteReport> {
    let relocations: HashMap<String, String> = moves
        .iter()
        .map(|m| (m.new_path.clone(), m.old_path.clone()))
        .collect();
    let mut project = TsProject::open(
        session.root(),
        &session.settings().rewrite,
        &relocations,
        mapping.old_names(),
    )?;
    let report = rewrite_imports(&mut project, mapping);
    let saved = project.save()?;
    if !saved.is_empty() {
        vcs.add(&saved)?;
        let message = session.settings().rewrite.commit_message.replace("{repo}", repo);
        vcs.commit(&message)
            .with_context(|| format!("commit rewritten imports for {repo}"))?;
    }
    info!(
        repo,
        modified = saved.len(),
        errors = report.errors,
        skipped = report.skipped.len(),
        "branch rewritten"
    );
    Ok(report)
}

/// Rewrite the current checkout in place, with no relocations.
#[instrument(skip_all)]
pub fn rewrite_in_place(phase: &MapPhase, dry_run: bool) -> Result<RewriteReport> {
    let session = phase.session();
    let mut project = TsProject::open(
        session.root(),
        &session.settings().rewrite,
        &HashMap::new(),
        phase.mapping().old_names(),
    )?;
    let report = rewrite_imports(&mut project, phase.mapping());
    if !dry_run {
        project.save()?;
    }
    Ok(report)
}
