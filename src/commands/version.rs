//! Command: print version information.
use std::io::Write;

/// The build version: `DOTSTATE_VERSION` at build time, else the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("DOTSTATE_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the dotstate version.
///
/// # Errors
///
/// Returns an error if `out` cannot be written.
pub fn run(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "dotstate {}", version())
}
