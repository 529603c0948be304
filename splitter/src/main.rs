//! Monorepo splitter CLI.
//!
//! Reads `split.toml` (or `--settings`), the dependency graph and the
//! mapping config, then plans, reports, splits and rewrites. Results are
//! printed to stdout as JSON.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;

use splitter::error::SplitError;
use splitter::exit_codes;
use splitter::io::git::Git;
use splitter::io::settings::{SETTINGS_FILE, SplitSettings, load_settings, write_settings};
use splitter::logging;
use splitter::pipeline::{MapPhase, SplitSession, rewrite_in_place};

#[derive(Parser)]
#[command(
    name = "splitter",
    version,
    about = "Split a monorepo into packages, keeping history and fixing imports"
)]
struct Cli {
    /// Repository root.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Settings file (default: `<root>/split.toml`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default settings file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the planned moves per destination repo.
    Plan,
    /// Print one record per graph node with its destination and dependencies.
    Export,
    /// Print the package-level dependency chart.
    Chart,
    /// Print the files that depend on PATH.
    Dependents {
        /// Old path, as named in the dependency graph.
        path: String,
    },
    /// Create one split branch per destination repo and move files on it.
    Split,
    /// Rewrite imports of the current checkout in place.
    Rewrite {
        /// Report the rewrites without writing files.
        #[arg(long)]
        dry_run: bool,
    },
    /// Split, then rewrite and commit imports on every split branch.
    Run,
}

fn main() {
    logging::init();
    let code = match run(Cli::parse()) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(|| cli.root.join(SETTINGS_FILE));
    match cli.command {
        Command::Init { force } => cmd_init(&settings_path, force),
        Command::Plan => {
            let phase = mapped(&cli.root, &settings_path)?;
            print_json(&phase.plan())
        }
        Command::Export => print_json(&mapped(&cli.root, &settings_path)?.mapping().export()),
        Command::Chart => print_json(
            &mapped(&cli.root, &settings_path)?
                .mapping()
                .export_package_dependencies_chart(),
        ),
        Command::Dependents { path } => {
            let phase = mapped(&cli.root, &settings_path)?;
            print_json(phase.mapping().dependents_of(&path))
        }
        Command::Split => {
            let phase = mapped(&cli.root, &settings_path)?;
            let git = Git::new(&cli.root);
            let moved = phase.split(&git)?;
            print_json(moved.outcomes())
        }
        Command::Rewrite { dry_run } => {
            let phase = mapped(&cli.root, &settings_path)?;
            print_json(&rewrite_in_place(&phase, dry_run)?)
        }
        Command::Run => {
            let phase = mapped(&cli.root, &settings_path)?;
            let git = Git::new(&cli.root);
            let done = phase.split(&git)?.rewrite(&git)?;
            print_json(&done)
        }
    }
}

fn cmd_init(settings_path: &Path, force: bool) -> Result<()> {
    if settings_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            settings_path.display()
        );
    }
    write_settings(settings_path, &SplitSettings::default())
}

/// Load settings and run the graph and map phases.
fn mapped(root: &Path, settings_path: &Path) -> Result<MapPhase> {
    let settings = load_settings(settings_path)?;
    SplitSession::new(root, settings)?
        .build_dependency_graph()?
        .map()
}

/// Serialize `value` to pretty-printed JSON on stdout.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(split) = err.downcast_ref::<SplitError>() {
        return match split {
            e if e.is_precondition() => exit_codes::PRECONDITION,
            SplitError::AggregateMove { .. } | SplitError::CommitFailure { .. } => {
                exit_codes::PARTIAL
            }
            _ => exit_codes::INVALID,
        };
    }
    exit_codes::INVALID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["splitter", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["splitter", "plan", "--root", "/repo", "--settings", "x.toml"]);
        assert!(matches!(cli.command, Command::Plan));
        assert_eq!(cli.root, PathBuf::from("/repo"));
        assert_eq!(cli.settings, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn parse_dependents_and_rewrite() {
        let cli = Cli::parse_from(["splitter", "dependents", "lib/mapping.ts"]);
        assert!(matches!(cli.command, Command::Dependents { ref path } if path == "lib/mapping.ts"));
        let cli = Cli::parse_from(["splitter", "rewrite", "--dry-run"]);
        assert!(matches!(cli.command, Command::Rewrite { dry_run: true }));
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let stale = anyhow::Error::new(SplitError::StaleSplitBranch {
            branches: vec!["split/new".to_string()],
        });
        assert_eq!(exit_code_for(&stale), exit_codes::PRECONDITION);

        let partial = anyhow::Error::new(SplitError::CommitFailure {
            target_repo: "new".to_string(),
            succeeded: Vec::new(),
            reason: "hook".to_string(),
        });
        assert_eq!(exit_code_for(&partial), exit_codes::PARTIAL);

        let wrapped = anyhow::Error::new(SplitError::DirtyWorkingTree { files: Vec::new() })
            .context("split");
        assert_eq!(exit_code_for(&wrapped), exit_codes::PRECONDITION);

        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), exit_codes::INVALID);
    }
}
