//! Domain-specific error types for the reconciliation engine.
//!
//! Core modules return [`StateError`] through the [`Result`] alias. Command
//! handlers at the CLI boundary convert them to [`anyhow::Error`] via the
//! standard `?` operator.
//!
//! # Error kinds
//!
//! ```text
//! StateError
//! ├── UnsupportedEntry   — device, fifo, socket in the destination
//! ├── Parse              — tool output, persisted JSON, version strings
//! ├── MissingConfig      — e.g. keepassxc.database unset
//! ├── Io                 — backend I/O failure (path attached)
//! ├── Prompt             — password too long, EOF before input
//! ├── ChildProcess       — non-zero exit or signal
//! ├── Command            — "<tool> <quoted-args>: <underlying>"
//! └── Target             — reconciliation failure for one target path
//! ```
//!
//! Errors are [`Clone`] so that lazily produced contents can memoise a
//! failure and report it identically on every access.

use std::sync::Arc;

use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T, E = StateError> = std::result::Result<T, E>;

/// Errors that arise while probing, applying, or persisting state.
#[derive(Error, Debug, Clone)]
pub enum StateError {
    /// The destination contains an entry kind the engine cannot manage.
    #[error("{path}: unsupported entry type {kind}")]
    UnsupportedEntry {
        /// Path of the offending entry.
        path: String,
        /// Human-readable kind (e.g. `"fifo"`).
        kind: String,
    },

    /// Malformed output, persisted data, or version string.
    #[error("cannot parse {what}: {reason}")]
    Parse {
        /// What was being parsed.
        what: String,
        /// Why it failed.
        reason: String,
    },

    /// A configuration value required at this point is not set.
    #[error("{0} not set")]
    MissingConfig(String),

    /// An I/O operation against the backend failed.
    #[error("{path}: {source}")]
    Io {
        /// Path the operation was applied to.
        path: String,
        /// Underlying I/O error.
        source: Arc<std::io::Error>,
    },

    /// Reading a password failed.
    #[error("{0}")]
    Prompt(String),

    /// A child process exited unsuccessfully.
    #[error("{command}: {reason}")]
    ChildProcess {
        /// Program (or script name) that was run.
        command: String,
        /// Exit status description.
        reason: String,
    },

    /// A failure while invoking an external tool, tagged with the full
    /// shell-quoted command line.
    #[error("{command}: {source}")]
    Command {
        /// `<tool> <quoted-args>`.
        command: String,
        /// Underlying failure.
        source: Box<StateError>,
    },

    /// Reconciliation of one target failed.
    #[error("{path}: {source}")]
    Target {
        /// Target path the failure belongs to.
        path: String,
        /// Underlying failure.
        source: Box<StateError>,
    },

    /// A requested target is not present in the source state.
    #[error("{0}: not in source state")]
    NotManaged(String),

    /// Two source entries map to the same target name.
    #[error("{target}: duplicate source state entries ({first}, {second})")]
    DuplicateTarget {
        /// Target name both entries map to.
        target: String,
        /// First source path.
        first: String,
        /// Second source path.
        second: String,
    },

    /// The backend does not implement this operation.
    #[error("{operation} is not supported by the {system} system")]
    Unsupported {
        /// Operation name.
        operation: &'static str,
        /// Backend name.
        system: &'static str,
    },

    /// The persistent key-value store failed.
    #[error("persistent state: {0}")]
    PersistentState(String),

    /// The pass was interrupted before the next entry.
    #[error("interrupted")]
    Cancelled,
}

impl StateError {
    /// Wrap an [`std::io::Error`] with the path it concerns.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Attach the offending target path to an error.
    #[must_use]
    pub fn for_target(self, path: impl Into<String>) -> Self {
        Self::Target {
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Return `true` if this is an I/O error of kind `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
