//! End-to-end split scenarios against temporary git repositories.
//!
//! Each test seeds a small monorepo (see `test_support::FIXTURE_SOURCES`),
//! then drives the phase pipeline with the real `git` backend.

use splitter::error::SplitError;
use splitter::io::git::{Git, Vcs};
use splitter::io::settings::SplitSettings;
use splitter::pipeline::{MapPhase, SplitSession};
use splitter::test_support::TestRepo;

fn map_phase(repo: &TestRepo) -> MapPhase {
    SplitSession::new(repo.path(), SplitSettings::default())
        .expect("session")
        .build_dependency_graph()
        .expect("graph")
        .map()
        .expect("map")
}

fn split_error(err: anyhow::Error) -> SplitError {
    err.downcast::<SplitError>().expect("split error")
}

#[test]
fn stale_split_branch_blocks_everything() {
    let repo = TestRepo::seeded().expect("repo");
    repo.git(&["branch", "split/leftover"]).expect("branch");
    let head = repo.git(&["rev-parse", "HEAD"]).expect("head");

    let git = Git::new(repo.path());
    let err = map_phase(&repo).split(&git).expect_err("stale branch");
    match split_error(err) {
        SplitError::StaleSplitBranch { branches } => assert_eq!(branches, vec!["split/leftover"]),
        other => panic!("unexpected error: {other}"),
    }

    let branches = repo
        .git(&["branch", "--format=%(refname:short)"])
        .expect("branches");
    assert_eq!(branches.lines().collect::<Vec<_>>(), vec!["main", "split/leftover"]);
    assert_eq!(repo.git(&["rev-parse", "HEAD"]).expect("head"), head);
    assert_eq!(git.current_branch().expect("branch").as_deref(), Some("main"));
}

#[test]
fn dirty_tree_is_rejected() {
    let repo = TestRepo::seeded().expect("repo");
    repo.write("scratch.ts", "export {};\n").expect("write");

    let err = map_phase(&repo)
        .split(&Git::new(repo.path()))
        .expect_err("dirty");
    match split_error(err) {
        SplitError::DirtyWorkingTree { files } => assert_eq!(files, vec!["scratch.ts"]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn split_creates_one_branch_per_destination() {
    let repo = TestRepo::seeded().expect("repo");
    let git = Git::new(repo.path());

    let moved = map_phase(&repo).split(&git).expect("split");
    assert_eq!(moved.outcomes().len(), 2);
    assert!(moved.outcomes().iter().all(|o| o.is_success()));

    assert_eq!(
        repo.tracked_files("split/new").expect("files"),
        vec![
            "PackageMap.json",
            "doc/dependency.json",
            "src/mapping.ts",
            "test/test_fixtures.ts",
        ]
    );
    assert_eq!(
        repo.tracked_files("split/monorepo").expect("files"),
        vec![
            "PackageMap.json",
            "doc/dependency.json",
            "lib/__tests__/git.test.ts",
            "lib/git.ts",
            "lib/index.ts",
        ]
    );
    assert_eq!(
        git.current_branch().expect("branch").as_deref(),
        Some("split/monorepo")
    );
    // main is untouched.
    assert!(
        repo.tracked_files("main")
            .expect("files")
            .contains(&"lib/mapping.ts".to_string())
    );
}

#[test]
fn moved_files_keep_history() {
    let repo = TestRepo::seeded().expect("repo");
    map_phase(&repo)
        .split(&Git::new(repo.path()))
        .expect("split");

    let log = repo
        .git(&["log", "split/new", "--follow", "--format=%s", "--", "src/mapping.ts"])
        .expect("log");
    let subjects: Vec<&str> = log.lines().collect();
    assert_eq!(subjects.first(), Some(&"Finalize split for new"));
    assert!(subjects.contains(&"seed monorepo"));
}

#[test]
fn ignored_files_are_not_moved() {
    let repo = TestRepo::seeded().expect("repo");
    repo.write(".gitignore", "generated/\n").expect("write");
    repo.write(
        "doc/dependency.json",
        r#"{"lib/mapping.ts": [], "lib/index.ts": ["lib/mapping.ts"], "generated/out.ts": []}"#,
    )
    .expect("write");
    repo.write(
        "PackageMap.json",
        r#"{"OldPatterns": {
            "^lib/mapping\\.ts$": {"Repo": "new", "Package": "new", "Path": "src/mapping.ts"},
            "^generated/(.*)$": {"Repo": "new", "Package": "new", "Path": "gen/$1"},
            "^lib/(.*)$": {"Repo": "monorepo", "Package": "N/A", "Path": "lib/$1", "Order": 10}
        }}"#,
    )
    .expect("write");
    repo.commit_all("ignore generated").expect("commit");
    repo.write("generated/out.ts", "export {};\n").expect("write");

    let moved = map_phase(&repo)
        .split(&Git::new(repo.path()))
        .expect("split");
    assert_eq!(moved.outcomes().len(), 1);
    assert_eq!(moved.outcomes()[0].file.old_path, "lib/mapping.ts");
    assert!(
        !repo
            .tracked_files("split/new")
            .expect("files")
            .iter()
            .any(|f| f.starts_with("gen/"))
    );
    assert!(repo.exists("generated/out.ts"));
}

#[test]
fn failed_move_is_reported_after_all_moves_run() {
    let repo = TestRepo::seeded().expect("repo");
    repo.write(
        "doc/dependency.json",
        r#"{"lib/mapping.ts": [], "lib/ghost.ts": [], "lib/git.ts": ["lib/mapping.ts"]}"#,
    )
    .expect("write");
    repo.write(
        "PackageMap.json",
        r#"{"OldPatterns": {
            "^lib/ghost\\.ts$": {"Repo": "new", "Package": "new", "Path": "src/ghost.ts"},
            "^lib/mapping\\.ts$": {"Repo": "new", "Package": "new", "Path": "src/mapping.ts"},
            "^lib/(.*)$": {"Repo": "monorepo", "Package": "N/A", "Path": "lib/$1", "Order": 10}
        }}"#,
    )
    .expect("write");
    repo.commit_all("add ghost").expect("commit");

    let git = Git::new(repo.path());
    let err = map_phase(&repo).split(&git).expect_err("ghost move");
    match split_error(err) {
        SplitError::AggregateMove {
            target_repo,
            failures,
            outcomes,
        } => {
            assert_eq!(target_repo, "new");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].old_path, "lib/ghost.ts");
            assert_eq!(outcomes.len(), 2);
            assert!(outcomes.iter().any(|o| o.is_success()));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The branch is left partially migrated and checked out.
    assert_eq!(git.current_branch().expect("branch").as_deref(), Some("split/new"));
    assert!(repo.exists("src/mapping.ts"));
    assert!(
        repo.git(&["branch", "--list", "split/monorepo"])
            .expect("branches")
            .is_empty()
    );
}

#[test]
fn run_rewrites_imports_on_every_branch() {
    let repo = TestRepo::seeded().expect("repo");
    let git = Git::new(repo.path());

    let done = map_phase(&repo)
        .split(&git)
        .expect("split")
        .rewrite(&git)
        .expect("rewrite");
    assert_eq!(done.reports().keys().collect::<Vec<_>>(), vec!["new", "monorepo"]);
    assert_eq!(done.reports()["new"].rewrites.len(), 1);
    assert_eq!(done.reports()["monorepo"].errors, 0);

    let fixtures = repo
        .show("split/new", "test/test_fixtures.ts")
        .expect("show");
    assert!(fixtures.starts_with("import { PackageMapping } from \"../src/mapping\";"));

    let index = repo.show("split/monorepo", "lib/index.ts").expect("show");
    assert!(index.contains("export * from \"./git\";"));
    assert!(index.contains("export { PackageMapping } from \"new\";"));

    let test = repo
        .show("split/monorepo", "lib/__tests__/git.test.ts")
        .expect("show");
    assert!(test.contains("import { fixture } from \"new\";"));
    assert!(test.contains("import { git } from \"../git\";"));

    assert_eq!(
        repo.git(&["log", "-1", "--format=%s", "split/new"]).expect("log"),
        "Rewrite imports for new"
    );
    assert!(git.status().expect("status").is_empty());
}
