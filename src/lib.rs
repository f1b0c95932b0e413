//! Dotfile state reconciliation engine.
//!
//! A source state describes what the destination (usually `$HOME`) should
//! contain: directories, files, symlinks, scripts, and paths that must be
//! absent. The engine probes the actual state of each target path through an
//! abstract [`system::System`] backend and applies the minimum set of
//! operations to converge it.
//!
//! The public API is organised into layers:
//!
//! - **[`system`]**: backends (real filesystem, dry-run, dump) and the
//!   persistent key-value store
//! - **[`state`]**: actual and target entries, lazy contents, entry state
//! - **[`source`]**: the source state and the source-directory reader
//! - **[`reconcile`]**: the driver that walks targets and applies them
//! - **[`secret`]**: credential-tool lookups used while building contents
//! - **[`commands`]**: top-level subcommand orchestration (`apply`, `verify`, `dump`, ...)
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod paths;
pub mod perm;
pub mod reconcile;
pub mod secret;
pub mod source;
pub mod state;
pub mod system;
