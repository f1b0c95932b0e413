//! Dump command implementation.
use anyhow::{Context as _, Result};
use std::io::Write;

use super::CommandSetup;
use crate::cli::DumpOpts;
use crate::config::OutputFormat;
use crate::reconcile::{ApplyOptions, CancelToken, apply_args};
use crate::system::DumpSystem;

/// Run the dump command, writing the target state to `out`.
///
/// Entries are keyed by target name; the destination is never read.
///
/// # Errors
///
/// Returns an error if a target cannot be evaluated or the output cannot be
/// serialized or written.
pub fn run(
    setup: &CommandSetup,
    opts: &DumpOpts,
    cancel: &CancelToken,
    out: &mut dyn Write,
) -> Result<()> {
    let system = DumpSystem::new()?;
    let options = ApplyOptions {
        umask: 0o777,
        ..setup.apply_options(&opts.select)
    };
    apply_args(
        &system,
        &setup.source,
        "",
        &opts.select.targets,
        &options,
        cancel,
    )?;

    let data = system.data();
    let rendered = match opts.format.unwrap_or(setup.config.format) {
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&data).context("serializing dump")?;
            json.push('\n');
            json
        }
        OutputFormat::Toml => toml::to_string_pretty(&data).context("serializing dump")?,
    };
    out.write_all(rendered.as_bytes()).context("writing dump")?;
    Ok(())
}
