//! Unmanaged command implementation.
use anyhow::{Context as _, Result};
use std::io::Write;

use super::CommandSetup;
use crate::reconcile::unmanaged;

/// List destination entries that are neither managed nor ignored, one
/// target name per line.
///
/// # Errors
///
/// Returns an error if the destination cannot be walked or the output
/// cannot be written.
pub fn run(setup: &CommandSetup, out: &mut dyn Write) -> Result<()> {
    let system = setup.open_system()?;
    for name in unmanaged(&system, &setup.source, &setup.dest_dir)? {
        writeln!(out, "{name}").context("writing output")?;
    }
    Ok(())
}
