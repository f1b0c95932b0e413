//! Backends that reconciliation runs against.
//!
//! A [`System`] bundles the filesystem-like operations the engine needs,
//! command execution, and access to a [`PersistentState`] store. Three
//! backends are provided:
//!
//! - [`RealSystem`]: operates on the host filesystem.
//! - [`DryRunSystem`]: forwards reads, logs and suppresses mutations.
//! - [`DumpSystem`]: records mutations into a serialisable tree.
pub mod dry_run;
pub mod dump;
pub mod persistent_state;
pub mod real;

use std::fmt;

pub use dry_run::DryRunSystem;
pub use dump::{DumpEntry, DumpSystem};
pub use persistent_state::{
    DryRunPersistentState, ENTRY_STATE_BUCKET, PersistentState, RedbPersistentState,
    SCRIPT_ONCE_STATE_BUCKET,
};
pub use real::RealSystem;

use crate::error::Result;
use crate::exec::CmdRunner;

/// Kind of a filesystem entry, as seen by a non-following stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
    /// Symbolic link.
    Symlink,
    /// Anything else (device, fifo, socket), described for diagnostics.
    Other(String),
}

/// Result of [`System::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Entry kind.
    pub kind: FileKind,
    /// Permission bits (low 12 bits of the mode).
    pub perm: u32,
}

/// What a [`System::walk`] visitor wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Keep walking, descending into directories.
    Continue,
    /// Do not descend into the directory just visited.
    SkipDir,
}

/// Visitor callback for [`System::walk`].
pub type WalkFn<'a> = dyn FnMut(&str, &FileInfo) -> Result<WalkAction> + 'a;

/// Filesystem-like operations plus a persistent key-value store.
///
/// All paths are absolute forward-slash strings (bare target names for the
/// dump backend). Mutations are idempotent: repeating one with the same
/// arguments leaves the same final state.
pub trait System: CmdRunner + Send + Sync + fmt::Debug {
    /// Non-following stat. Returns `None` if nothing exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error for failures other than "not found".
    fn stat(&self, path: &str) -> Result<Option<FileInfo>>;

    /// Read a regular file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Read a symlink's target.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is not a readable symlink.
    fn read_link(&self, path: &str) -> Result<String>;

    /// Create or replace a regular file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write_file(&self, path: &str, contents: &[u8], perm: u32) -> Result<()>;

    /// Create a symlink at `path` pointing to `linkname`, replacing whatever
    /// is there.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be created.
    fn write_symlink(&self, linkname: &str, path: &str) -> Result<()>;

    /// Create a single directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    fn mkdir(&self, path: &str, perm: u32) -> Result<()>;

    /// Change permissions.
    ///
    /// # Errors
    ///
    /// Returns an error if the permissions cannot be changed.
    fn chmod(&self, path: &str, perm: u32) -> Result<()>;

    /// Rename an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    fn rename(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Remove an entry recursively. A missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists and cannot be removed.
    fn remove_all(&self, path: &str) -> Result<()>;

    /// Execute `contents` as a script named `name` in `work_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be started or exits non-zero.
    fn run_script(&self, name: &str, work_dir: &str, contents: &[u8]) -> Result<()>;

    /// Walk the tree below `root` depth-first in lexicographic order without
    /// following symlinks. `root` itself is not visited.
    ///
    /// # Errors
    ///
    /// Returns the first error from the walk or from `visit`.
    fn walk(&self, root: &str, visit: &mut WalkFn<'_>) -> Result<()>;

    /// The key-value store attached to this backend.
    fn persistent_state(&self) -> &dyn PersistentState;
}

