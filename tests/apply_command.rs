#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing
)]
//! Integration tests for the `apply` and `verify` commands.
//!
//! Each test builds a source tree in a temporary directory, runs the command
//! runner against a temporary home directory, and inspects the result on
//! disk.

mod common;

use std::fs;

use common::*;
use dotstate::cli::{ApplyOpts, SelectOpts};
use dotstate::commands::{apply, verify};
use dotstate::logging::Logger;
use dotstate::reconcile::{CancelToken, IncludeSet};

fn apply_all(ctx: &IntegrationTestContext) -> dotstate::reconcile::ApplyStats {
    apply::run(
        &ctx.setup(),
        &ApplyOpts::default(),
        &Logger::default(),
        &CancelToken::new(),
    )
    .unwrap()
}

fn verify_all(ctx: &IntegrationTestContext) -> bool {
    verify::run(
        &ctx.setup(),
        &SelectOpts::default(),
        &Logger::default(),
        &CancelToken::new(),
    )
    .unwrap()
}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

#[test]
fn apply_installs_source_tree() {
    let ctx = sample_source().build();
    let stats = apply_all(&ctx);
    assert_eq!(stats.changed, 8, "{stats:?}");

    assert_eq!(
        fs::read_to_string(ctx.home_path(".bashrc")).unwrap(),
        "export EDITOR=vi\n"
    );
    assert_eq!(
        fs::read_link(ctx.home_path(".vimrc")).unwrap().to_string_lossy(),
        ".config/vim/vimrc"
    );
    assert_eq!(fs::read_to_string(ctx.home_path(".notes")).unwrap(), "initial\n");
}

#[cfg(unix)]
#[test]
fn apply_sets_permissions_from_attributes() {
    use std::os::unix::fs::PermissionsExt as _;

    let ctx = sample_source().build();
    apply_all(&ctx);

    let mode = |name: &str| fs::metadata(ctx.home_path(name)).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode(".bashrc"), 0o644);
    assert_eq!(mode(".ssh"), 0o700);
    assert_eq!(mode(".ssh/config"), 0o600);
    assert_eq!(mode(".local/bin"), 0o755);
    assert_eq!(mode(".local/bin/hello"), 0o755);
}

#[test]
fn second_apply_changes_nothing() {
    let ctx = sample_source().build();
    apply_all(&ctx);
    let stats = apply_all(&ctx);
    assert_eq!(stats.changed, 0, "{stats:?}");
    assert_eq!(stats.already_ok, 8);
    assert!(verify_all(&ctx));
}

#[cfg(unix)]
#[test]
fn existing_entries_get_umasked_permissions() {
    use std::os::unix::fs::PermissionsExt as _;

    let ctx = TestContextBuilder::new()
        .with_source_file("dot_bashrc", "x")
        .with_source_dir("dot_config")
        .with_home_file(".bashrc", "x")
        .build();
    let bashrc = ctx.home_path(".bashrc");
    let config = ctx.home_path(".config");
    fs::set_permissions(&bashrc, fs::Permissions::from_mode(0o600)).unwrap();
    fs::create_dir(&config).unwrap();
    fs::set_permissions(&config, fs::Permissions::from_mode(0o700)).unwrap();

    apply_all(&ctx);

    let mode = |path: &std::path::Path| fs::metadata(path).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode(&bashrc), 0o644);
    assert_eq!(mode(&config), 0o755);
    assert!(verify_all(&ctx));
}

#[test]
fn create_only_file_keeps_local_edits() {
    let ctx = sample_source().with_home_file(".notes", "mine\n").build();
    apply_all(&ctx);
    assert_eq!(fs::read_to_string(ctx.home_path(".notes")).unwrap(), "mine\n");
}

#[test]
fn apply_replaces_modified_file() {
    let ctx = sample_source().with_home_file(".bashrc", "old\n").build();
    apply_all(&ctx);
    assert_eq!(
        fs::read_to_string(ctx.home_path(".bashrc")).unwrap(),
        "export EDITOR=vi\n"
    );
}

#[test]
fn dry_run_leaves_destination_untouched() {
    let ctx = sample_source().build();
    let stats = apply::run(
        &ctx.setup(),
        &ApplyOpts {
            dry_run: true,
            ..ApplyOpts::default()
        },
        &Logger::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(stats.changed, 8);
    assert!(!ctx.home_path(".bashrc").exists());
    assert!(!ctx.home_path(".ssh").exists());
}

#[test]
fn remove_list_deletes_targets() {
    let ctx = TestContextBuilder::new()
        .with_source_file(".dotstateremove", "# stale\n.oldrc\n.cache/junk/\n")
        .with_home_file(".oldrc", "x")
        .with_home_file(".cache/junk/a", "y")
        .with_home_file(".cache/keep", "z")
        .build();
    apply_all(&ctx);
    assert!(!ctx.home_path(".oldrc").exists());
    assert!(!ctx.home_path(".cache/junk").exists());
    assert!(ctx.home_path(".cache/keep").exists());
}

#[test]
fn include_set_limits_kinds() {
    let ctx = sample_source().build();
    let stats = apply::run(
        &ctx.setup(),
        &ApplyOpts {
            select: SelectOpts {
                include: IncludeSet::DIRS,
                ..SelectOpts::default()
            },
            ..ApplyOpts::default()
        },
        &Logger::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(stats.changed, 3);
    assert!(ctx.home_path(".local/bin").is_dir());
    assert!(!ctx.home_path(".bashrc").exists());
}

#[test]
fn named_targets_are_resolved_against_destination() {
    let ctx = sample_source().build();
    let setup = ctx.setup();
    let target = format!("{}/.ssh", setup.dest_dir);
    apply::run(
        &setup,
        &ApplyOpts {
            select: SelectOpts {
                recursive: true,
                targets: vec![target],
                ..SelectOpts::default()
            },
            ..ApplyOpts::default()
        },
        &Logger::default(),
        &CancelToken::new(),
    )
    .unwrap();
    assert!(ctx.home_path(".ssh/config").exists());
    assert!(!ctx.home_path(".bashrc").exists());
}

#[test]
fn unknown_target_fails() {
    let ctx = sample_source().build();
    let err = apply::run(
        &ctx.setup(),
        &ApplyOpts {
            select: SelectOpts {
                targets: vec![".zshrc".to_string()],
                ..SelectOpts::default()
            },
            ..ApplyOpts::default()
        },
        &Logger::default(),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(err.to_string().contains(".zshrc: not in source state"), "{err}");
}

#[test]
fn cancelled_apply_stops_before_first_entry() {
    let ctx = sample_source().build();
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = apply::run(&ctx.setup(), &ApplyOpts::default(), &Logger::default(), &cancel);
    assert!(result.is_err());
    assert!(!ctx.home_path(".bashrc").exists());
}

#[test]
fn ignored_names_are_not_produced() {
    let ctx = sample_source()
        .with_source_file(".dotstateignore", ".local/**\n")
        .build();
    apply_all(&ctx);
    assert!(ctx.home_path(".local").is_dir());
    assert!(!ctx.home_path(".local/bin").exists());
}

// ---------------------------------------------------------------------------
// scripts
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn run_once_script_runs_once_per_contents() {
    let ctx = TestContextBuilder::new()
        .with_source_file("run_once_setup.sh", "#!/bin/sh\necho ran >> setup.log\n")
        .build();
    apply_all(&ctx);
    apply_all(&ctx);
    assert_eq!(
        fs::read_to_string(ctx.home_path("setup.log")).unwrap(),
        "ran\n"
    );

    write(
        &ctx.source(),
        "run_once_setup.sh",
        "#!/bin/sh\necho ran again >> setup.log\n",
    );
    apply_all(&ctx);
    apply_all(&ctx);
    assert_eq!(
        fs::read_to_string(ctx.home_path("setup.log")).unwrap(),
        "ran\nran again\n"
    );
}

#[cfg(unix)]
#[test]
fn plain_script_runs_every_time() {
    let ctx = TestContextBuilder::new()
        .with_source_file("run_tick.sh", "#!/bin/sh\necho tick >> tick.log\n")
        .build();
    let stats = apply_all(&ctx);
    assert_eq!(stats.scripts, 1);
    apply_all(&ctx);
    assert_eq!(
        fs::read_to_string(ctx.home_path("tick.log")).unwrap(),
        "tick\ntick\n"
    );
}

#[cfg(unix)]
#[test]
fn failing_script_reports_target() {
    let ctx = TestContextBuilder::new()
        .with_source_file("run_fail.sh", "#!/bin/sh\nexit 3\n")
        .build();
    let err = apply::run(
        &ctx.setup(),
        &ApplyOpts::default(),
        &Logger::default(),
        &CancelToken::new(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("fail.sh"), "{err}");
}

#[cfg(unix)]
#[test]
fn keep_going_applies_entries_after_a_failure() {
    let ctx = TestContextBuilder::new()
        .with_source_file("run_a_fail.sh", "#!/bin/sh\nexit 1\n")
        .with_source_file("dot_z", "z\n")
        .build();
    let result = apply::run(
        &ctx.setup(),
        &ApplyOpts {
            keep_going: true,
            ..ApplyOpts::default()
        },
        &Logger::default(),
        &CancelToken::new(),
    );
    assert!(result.is_err());
    assert!(ctx.home_path(".z").exists());
}

// ---------------------------------------------------------------------------
// verify
// ---------------------------------------------------------------------------

#[test]
fn verify_reports_missing_file() {
    let ctx = TestContextBuilder::new().with_source_file("c", "c\n").build();
    assert!(!verify_all(&ctx));
    assert!(!ctx.home_path("c").exists());
    apply_all(&ctx);
    assert!(verify_all(&ctx));
}

#[test]
fn verify_empty_source_is_clean() {
    let ctx = TestContextBuilder::new().build();
    assert!(verify_all(&ctx));
}
