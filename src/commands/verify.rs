//! Verify command implementation.
use anyhow::Result;

use super::CommandSetup;
use crate::cli::SelectOpts;
use crate::logging::Logger;
use crate::reconcile::{CancelToken, apply_args};
use crate::system::DryRunSystem;

/// Run the verify command: a dry-run apply that only reports whether
/// anything would change.
///
/// Returns `true` when the destination already matches.
///
/// # Errors
///
/// Returns an error if the persistent state cannot be opened or any target
/// cannot be evaluated.
pub fn run(
    setup: &CommandSetup,
    opts: &SelectOpts,
    log: &Logger,
    cancel: &CancelToken,
) -> Result<bool> {
    let real = setup.open_system()?;
    let system = DryRunSystem::new(&real);

    log.stage("Verifying");
    let stats = apply_args(
        &system,
        &setup.source,
        &setup.dest_dir,
        &opts.targets,
        &setup.apply_options(opts),
        cancel,
    )?;
    log.debug(&stats.summary(true));

    let clean = !system.modified();
    if !clean {
        log.warn("destination differs from source state");
    }
    Ok(clean)
}
