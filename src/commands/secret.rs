//! Secret command implementation.
use anyhow::{Context as _, Result};
use std::io::Write;

use crate::cli::KeePassXcOpts;
use crate::config::Config;
use crate::exec::CmdRunner;
use crate::secret::{KeePassXc, PasswordPrompt};

/// Look up a KeePassXC entry and write it to `out`: the single attribute
/// value when one is named, otherwise every attribute as a JSON object.
///
/// # Errors
///
/// Returns an error if the database is not configured or the lookup fails.
pub fn run_keepassxc(
    config: &Config,
    opts: &KeePassXcOpts,
    runner: &dyn CmdRunner,
    prompt: Box<dyn PasswordPrompt>,
    out: &mut dyn Write,
) -> Result<()> {
    let mut keepassxc = KeePassXc::new(config.keepassxc.clone(), prompt);
    if let Some(attribute) = &opts.attribute {
        let value = keepassxc.attribute(runner, &opts.entry, attribute)?;
        writeln!(out, "{value}").context("writing output")?;
    } else {
        let data = keepassxc.show(runner, &opts.entry)?;
        let json = serde_json::to_string_pretty(&data).context("serializing entry")?;
        writeln!(out, "{json}").context("writing output")?;
    }
    Ok(())
}
