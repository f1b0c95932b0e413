//! Build a [`SourceState`] from a directory whose file names carry
//! attributes (`dot_`, `private_`, `executable_`, `create_`, `symlink_`,
//! `run_`, `once_`).
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::SourceState;
use crate::error::{Result, StateError};
use crate::paths::{join_slash, to_slash};
use crate::state::{
    Lazy, TargetStateDir, TargetStateEntry, TargetStateFile, TargetStatePresent,
    TargetStateScript, TargetStateSymlink,
};

/// Glob patterns of target names to ignore, one per line.
pub const IGNORE_FILE_NAME: &str = ".dotstateignore";

/// Target names that must not exist, one per line.
pub const REMOVE_FILE_NAME: &str = ".dotstateremove";

const CREATE_PREFIX: &str = "create_";
const DOT_PREFIX: &str = "dot_";
const EXECUTABLE_PREFIX: &str = "executable_";
const ONCE_PREFIX: &str = "once_";
const PRIVATE_PREFIX: &str = "private_";
const RUN_PREFIX: &str = "run_";
const SYMLINK_PREFIX: &str = "symlink_";

#[derive(Debug, PartialEq, Eq)]
struct DirAttr {
    name: String,
    private: bool,
}

impl DirAttr {
    fn parse(source_name: &str) -> Self {
        let (private, rest) = strip(source_name, PRIVATE_PREFIX);
        Self {
            name: undot(rest),
            private,
        }
    }

    const fn perm(&self) -> u32 {
        if self.private { 0o700 } else { 0o777 }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SourceFileKind {
    Regular,
    Create,
    Symlink,
    Script { once: bool },
}

#[derive(Debug, PartialEq, Eq)]
struct FileAttr {
    name: String,
    kind: SourceFileKind,
    private: bool,
    executable: bool,
}

impl FileAttr {
    fn parse(source_name: &str) -> Self {
        if let Some(rest) = source_name.strip_prefix(RUN_PREFIX) {
            let (once, rest) = strip(rest, ONCE_PREFIX);
            return Self {
                name: rest.to_string(),
                kind: SourceFileKind::Script { once },
                private: false,
                executable: false,
            };
        }
        if let Some(rest) = source_name.strip_prefix(SYMLINK_PREFIX) {
            return Self {
                name: undot(rest),
                kind: SourceFileKind::Symlink,
                private: false,
                executable: false,
            };
        }
        let (create, rest) = strip(source_name, CREATE_PREFIX);
        let (private, rest) = strip(rest, PRIVATE_PREFIX);
        let (executable, rest) = strip(rest, EXECUTABLE_PREFIX);
        Self {
            name: undot(rest),
            kind: if create {
                SourceFileKind::Create
            } else {
                SourceFileKind::Regular
            },
            private,
            executable,
        }
    }

    const fn perm(&self) -> u32 {
        let mut perm = 0o666;
        if self.executable {
            perm |= 0o111;
        }
        if self.private {
            perm &= !0o077;
        }
        perm
    }
}

fn strip<'a>(name: &'a str, prefix: &str) -> (bool, &'a str) {
    name.strip_prefix(prefix)
        .map_or((false, name), |rest| (true, rest))
}

fn undot(name: &str) -> String {
    name.strip_prefix(DOT_PREFIX)
        .map_or_else(|| name.to_string(), |rest| format!(".{rest}"))
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StateError::io(to_slash(path), e)),
    }
}

fn lazy_read(path: PathBuf) -> Lazy<'static, Vec<u8>> {
    Lazy::new(move || std::fs::read(&path).map_err(|e| StateError::io(to_slash(&path), e)))
}

/// Tracks which source path produced each target name.
#[derive(Default)]
struct Builder {
    state: SourceState,
    origins: BTreeMap<String, String>,
}

impl Builder {
    fn insert(&mut self, target: String, origin: String, entry: TargetStateEntry) -> Result<()> {
        if let Some(first) = self.origins.get(&target) {
            return Err(StateError::DuplicateTarget {
                target,
                first: first.clone(),
                second: origin,
            });
        }
        self.origins.insert(target.clone(), origin);
        self.state.insert(target, entry)
    }
}

impl SourceState {
    /// Read a source directory. A missing directory yields an empty state.
    ///
    /// Top-level [`IGNORE_FILE_NAME`] and [`REMOVE_FILE_NAME`] are honoured;
    /// any other name starting with `.` is skipped. File contents are read
    /// lazily.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked, an ignore pattern is
    /// invalid, or two source entries map to the same target name.
    pub fn read(source_dir: &Path) -> Result<Self> {
        let mut builder = Builder::default();

        for pattern in read_lines(&source_dir.join(IGNORE_FILE_NAME))? {
            builder.state.add_ignore(&pattern)?;
        }
        for name in read_lines(&source_dir.join(REMOVE_FILE_NAME))? {
            let name = name.trim_matches('/').to_string();
            if !builder.state.ignored(&name) {
                builder.insert(name, REMOVE_FILE_NAME.to_string(), TargetStateEntry::Absent)?;
            }
        }

        let mut entries = walkdir::WalkDir::new(source_dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e)
                    if e.depth() == 0
                        && e
                            .io_error()
                            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) =>
                {
                    tracing::debug!(dir = %source_dir.display(), "source directory does not exist");
                    break;
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| to_slash(source_dir), to_slash);
                    return Err(StateError::io(path, std::io::Error::from(e)));
                }
            };

            let is_dir = entry.file_type().is_dir();
            let file_name = entry.file_name().to_string_lossy();
            if file_name.starts_with('.') {
                if is_dir {
                    entries.skip_current_dir();
                }
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(source_dir)
                .map(to_slash)
                .unwrap_or_default();
            let parent = relative
                .rsplit_once('/')
                .map(|(parent, _)| {
                    parent
                        .split('/')
                        .map(|component| DirAttr::parse(component).name)
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();

            if is_dir {
                let attr = DirAttr::parse(&file_name);
                let target = join_slash(&parent, &attr.name);
                if builder.state.ignored(&target) {
                    entries.skip_current_dir();
                    continue;
                }
                builder.insert(
                    target,
                    relative,
                    TargetStateEntry::Dir(TargetStateDir { perm: attr.perm() }),
                )?;
                continue;
            }

            let attr = FileAttr::parse(&file_name);
            let target = join_slash(&parent, &attr.name);
            if builder.state.ignored(&target) {
                continue;
            }
            let path = entry.path().to_path_buf();
            let target_entry = match attr.kind {
                SourceFileKind::Regular => TargetStateEntry::File(TargetStateFile {
                    perm: attr.perm(),
                    contents: lazy_read(path),
                }),
                SourceFileKind::Create => TargetStateEntry::Present(TargetStatePresent {
                    perm: attr.perm(),
                    contents: lazy_read(path),
                }),
                SourceFileKind::Symlink => {
                    let contents = lazy_read(path);
                    let what = relative.clone();
                    TargetStateEntry::Symlink(TargetStateSymlink {
                        linkname: Lazy::new(move || {
                            let bytes = contents.get()?.clone();
                            let text = String::from_utf8(bytes).map_err(|e| StateError::Parse {
                                what,
                                reason: e.to_string(),
                            })?;
                            Ok(text.trim_end_matches(['\r', '\n']).to_string())
                        }),
                    })
                }
                SourceFileKind::Script { once } => TargetStateEntry::Script(TargetStateScript {
                    name: target.clone(),
                    contents: lazy_read(path),
                    once,
                }),
            };
            builder.insert(target, relative, target_entry)?;
        }

        tracing::debug!(
            entries = builder.state.len(),
            dir = %source_dir.display(),
            "read source state"
        );
        Ok(builder.state)
    }
}
