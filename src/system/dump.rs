//! Backend that records the target tree instead of writing it.
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use super::{FileInfo, PersistentState, RedbPersistentState, System, WalkFn};
use crate::error::{Result, StateError};
use crate::exec::{CmdRunner, Invocation, run_invocation};

/// One recorded entry, keyed by target name in [`DumpSystem::data`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DumpEntry {
    /// A directory.
    Dir {
        /// Target name.
        name: String,
        /// Permission bits.
        perm: u32,
    },
    /// A regular file.
    File {
        /// Target name.
        name: String,
        /// Contents, lossily decoded as UTF-8.
        contents: String,
        /// Permission bits.
        perm: u32,
    },
    /// A script that would be run.
    Script {
        /// Script name.
        name: String,
        /// Script source, lossily decoded as UTF-8.
        contents: String,
    },
    /// A symbolic link.
    Symlink {
        /// Target name.
        name: String,
        /// Link target.
        linkname: String,
    },
}

/// A [`System`] that sees nothing on disk and records every mutation.
#[derive(Debug)]
pub struct DumpSystem {
    data: Mutex<BTreeMap<String, DumpEntry>>,
    persistent_state: RedbPersistentState,
}

impl DumpSystem {
    /// Create an empty dump with a private in-memory key-value store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory store cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            data: Mutex::new(BTreeMap::new()),
            persistent_state: RedbPersistentState::in_memory()?,
        })
    }

    /// The recorded entries, ordered by name.
    #[must_use]
    pub fn data(&self) -> BTreeMap<String, DumpEntry> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, DumpEntry>> {
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    const fn unsupported(operation: &'static str) -> StateError {
        StateError::Unsupported {
            operation,
            system: "dump",
        }
    }
}

fn in_subtree(key: &str, path: &str) -> bool {
    key == path
        || key
            .strip_prefix(path)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl CmdRunner for DumpSystem {
    fn idempotent_cmd_output(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        run_invocation(invocation)
    }
}

impl System for DumpSystem {
    fn stat(&self, _path: &str) -> Result<Option<FileInfo>> {
        Ok(None)
    }

    fn read_file(&self, _path: &str) -> Result<Vec<u8>> {
        Err(Self::unsupported("read_file"))
    }

    fn read_link(&self, _path: &str) -> Result<String> {
        Err(Self::unsupported("read_link"))
    }

    fn write_file(&self, path: &str, contents: &[u8], perm: u32) -> Result<()> {
        self.lock().insert(
            path.to_string(),
            DumpEntry::File {
                name: path.to_string(),
                contents: String::from_utf8_lossy(contents).into_owned(),
                perm,
            },
        );
        Ok(())
    }

    fn write_symlink(&self, linkname: &str, path: &str) -> Result<()> {
        self.lock().insert(
            path.to_string(),
            DumpEntry::Symlink {
                name: path.to_string(),
                linkname: linkname.to_string(),
            },
        );
        Ok(())
    }

    fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        self.lock().insert(
            path.to_string(),
            DumpEntry::Dir {
                name: path.to_string(),
                perm,
            },
        );
        Ok(())
    }

    fn chmod(&self, path: &str, new_perm: u32) -> Result<()> {
        if let Some(DumpEntry::Dir { perm, .. } | DumpEntry::File { perm, .. }) =
            self.lock().get_mut(path)
        {
            *perm = new_perm;
        }
        Ok(())
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let mut data = self.lock();
        let moved: Vec<String> = data
            .keys()
            .filter(|key| in_subtree(key, old_path))
            .cloned()
            .collect();
        for old_key in moved {
            if let Some(entry) = data.remove(&old_key) {
                let suffix = old_key.get(old_path.len()..).unwrap_or_default();
                let new_key = format!("{new_path}{suffix}");
                let entry = match entry {
                    DumpEntry::Dir { perm, .. } => DumpEntry::Dir {
                        name: new_key.clone(),
                        perm,
                    },
                    DumpEntry::File { contents, perm, .. } => DumpEntry::File {
                        name: new_key.clone(),
                        contents,
                        perm,
                    },
                    DumpEntry::Script { contents, .. } => DumpEntry::Script {
                        name: new_key.clone(),
                        contents,
                    },
                    DumpEntry::Symlink { linkname, .. } => DumpEntry::Symlink {
                        name: new_key.clone(),
                        linkname,
                    },
                };
                data.insert(new_key, entry);
            }
        }
        Ok(())
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        self.lock().retain(|key, _| !in_subtree(key, path));
        Ok(())
    }

    fn run_script(&self, name: &str, _work_dir: &str, contents: &[u8]) -> Result<()> {
        self.lock().insert(
            name.to_string(),
            DumpEntry::Script {
                name: name.to_string(),
                contents: String::from_utf8_lossy(contents).into_owned(),
            },
        );
        Ok(())
    }

    fn walk(&self, _root: &str, _visit: &mut WalkFn<'_>) -> Result<()> {
        Err(Self::unsupported("walk"))
    }

    fn persistent_state(&self) -> &dyn PersistentState {
        &self.persistent_state
    }
}
