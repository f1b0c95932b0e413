//! Backend that reports mutations instead of performing them.
use std::sync::atomic::{AtomicBool, Ordering};

use super::{DryRunPersistentState, FileInfo, PersistentState, System, WalkFn};
use crate::error::Result;
use crate::exec::{CmdRunner, Invocation};

/// Wraps another [`System`], forwarding reads and suppressing writes.
///
/// Each suppressed mutation is logged on the `dotstate::dry_run` target
/// before it is dropped, and flips [`modified`](Self::modified).
#[derive(Debug)]
pub struct DryRunSystem<'a> {
    system: &'a dyn System,
    modified: AtomicBool,
    persistent_state: DryRunPersistentState<'a>,
}

impl<'a> DryRunSystem<'a> {
    /// Wrap `system`.
    #[must_use]
    pub fn new(system: &'a dyn System) -> Self {
        Self {
            system,
            modified: AtomicBool::new(false),
            persistent_state: DryRunPersistentState::new(system.persistent_state()),
        }
    }

    /// Whether any mutation was attempted.
    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified.load(Ordering::Relaxed)
    }

    fn would(&self, verb: &str, desc: &str) {
        tracing::info!(target: "dotstate::dry_run", "would {verb}: {desc}");
        self.modified.store(true, Ordering::Relaxed);
    }
}

impl CmdRunner for DryRunSystem<'_> {
    fn idempotent_cmd_output(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        self.system.idempotent_cmd_output(invocation)
    }
}

impl System for DryRunSystem<'_> {
    fn stat(&self, path: &str) -> Result<Option<FileInfo>> {
        self.system.stat(path)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.system.read_file(path)
    }

    fn read_link(&self, path: &str) -> Result<String> {
        self.system.read_link(path)
    }

    fn write_file(&self, path: &str, contents: &[u8], perm: u32) -> Result<()> {
        self.would(
            "write file",
            &format!("{path} ({perm:04o}, {} bytes)", contents.len()),
        );
        Ok(())
    }

    fn write_symlink(&self, linkname: &str, path: &str) -> Result<()> {
        self.would("create symlink", &format!("{path} -> {linkname}"));
        Ok(())
    }

    fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        self.would("create directory", &format!("{path} ({perm:04o})"));
        Ok(())
    }

    fn chmod(&self, path: &str, perm: u32) -> Result<()> {
        self.would("chmod", &format!("{path} ({perm:04o})"));
        Ok(())
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        self.would("rename", &format!("{old_path} -> {new_path}"));
        Ok(())
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        self.would("remove", path);
        Ok(())
    }

    fn run_script(&self, name: &str, work_dir: &str, _contents: &[u8]) -> Result<()> {
        self.would("run script", &format!("{name} in {work_dir}"));
        Ok(())
    }

    fn walk(&self, root: &str, visit: &mut WalkFn<'_>) -> Result<()> {
        self.system.walk(root, visit)
    }

    fn persistent_state(&self) -> &dyn PersistentState {
        &self.persistent_state
    }
}
