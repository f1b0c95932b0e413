//! What currently exists at a destination path.
use crate::error::{Result, StateError};
use crate::state::lazy::{Lazy, LazyContents, LazyLinkname};
use crate::system::{FileKind, System};

/// The state of one destination path, probed through a [`System`].
///
/// File contents and link targets are read lazily through the backend that
/// probed them.
#[derive(Debug)]
pub enum ActualStateEntry<'a> {
    /// Nothing exists at the path.
    Absent {
        /// Destination path.
        path: String,
    },
    /// A directory.
    Dir {
        /// Destination path.
        path: String,
        /// Permission bits.
        perm: u32,
    },
    /// A regular file.
    File {
        /// Destination path.
        path: String,
        /// Permission bits.
        perm: u32,
        /// Current contents.
        contents: LazyContents<'a>,
    },
    /// A symbolic link.
    Symlink {
        /// Destination path.
        path: String,
        /// Current link target.
        linkname: LazyLinkname<'a>,
    },
}

impl<'a> ActualStateEntry<'a> {
    /// Probe `path` with a non-following stat.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnsupportedEntry`] for devices, fifos and
    /// sockets, and any error from the backend's stat.
    pub fn read(system: &'a dyn System, path: &str) -> Result<Self> {
        let Some(info) = system.stat(path)? else {
            return Ok(Self::Absent {
                path: path.to_string(),
            });
        };
        let owned = path.to_string();
        Ok(match info.kind {
            FileKind::Dir => Self::Dir {
                path: owned,
                perm: info.perm,
            },
            FileKind::File => {
                let read_path = owned.clone();
                Self::File {
                    path: owned,
                    perm: info.perm,
                    contents: Lazy::new(move || system.read_file(&read_path)),
                }
            }
            FileKind::Symlink => {
                let read_path = owned.clone();
                Self::Symlink {
                    path: owned,
                    linkname: Lazy::new(move || system.read_link(&read_path)),
                }
            }
            FileKind::Other(kind) => {
                return Err(StateError::UnsupportedEntry { path: owned, kind });
            }
        })
    }

    /// The destination path.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Absent { path }
            | Self::Dir { path, .. }
            | Self::File { path, .. }
            | Self::Symlink { path, .. } => path,
        }
    }

    /// Whether nothing exists at the path.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent { .. })
    }

    /// Remove whatever exists at the path.
    ///
    /// # Errors
    ///
    /// Returns any error from the backend's `remove_all`.
    pub fn remove(&self, system: &dyn System) -> Result<()> {
        if self.is_absent() {
            return Ok(());
        }
        system.remove_all(self.path())
    }
}
