//! Apply command implementation.
use anyhow::Result;

use super::CommandSetup;
use crate::cli::ApplyOpts;
use crate::logging::Logger;
use crate::reconcile::{ApplyOptions, ApplyStats, CancelToken, apply_args};
use crate::system::{DryRunSystem, System};

/// Run the apply command.
///
/// With `--dry-run` every mutation is logged and suppressed, and no entry
/// states are recorded.
///
/// # Errors
///
/// Returns an error if the persistent state cannot be opened or any target
/// fails to apply.
pub fn run(
    setup: &CommandSetup,
    opts: &ApplyOpts,
    log: &Logger,
    cancel: &CancelToken,
) -> Result<ApplyStats> {
    let real = setup.open_system()?;
    let dry_run_system;
    let system: &dyn System = if opts.dry_run {
        dry_run_system = DryRunSystem::new(&real);
        &dry_run_system
    } else {
        &real
    };

    let options = ApplyOptions {
        keep_going: opts.keep_going,
        record_entry_states: !opts.dry_run,
        ..setup.apply_options(&opts.select)
    };
    log.stage(if opts.dry_run {
        "Applying (dry run)"
    } else {
        "Applying"
    });
    log.debug(&format!(
        "include={} recursive={} umask={:03o}",
        options.include, options.recursive, options.umask
    ));

    let stats = apply_args(
        system,
        &setup.source,
        &setup.dest_dir,
        &opts.select.targets,
        &options,
        cancel,
    )?;
    log.summary(&stats.summary(opts.dry_run));
    Ok(stats)
}
