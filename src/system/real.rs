//! Backend that operates on the host filesystem.
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::process::Command;

use super::{FileInfo, FileKind, PersistentState, System, WalkAction, WalkFn};
use crate::error::{Result, StateError};
use crate::exec::{CmdRunner, Invocation, run_invocation};
use crate::paths::{base_name, to_native, to_slash};
use crate::perm::PERM_MASK;

/// A [`System`] that reads and writes the real filesystem.
#[derive(Debug)]
pub struct RealSystem {
    persistent_state: Box<dyn PersistentState>,
}

impl RealSystem {
    /// Create a backend using `persistent_state` as its key-value store.
    #[must_use]
    pub fn new(persistent_state: Box<dyn PersistentState>) -> Self {
        Self { persistent_state }
    }
}

#[cfg(unix)]
fn file_info(meta: &fs::Metadata) -> FileInfo {
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};
    let ft = meta.file_type();
    let kind = if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_dir() {
        FileKind::Dir
    } else if ft.is_file() {
        FileKind::File
    } else if ft.is_fifo() {
        FileKind::Other("fifo".to_string())
    } else if ft.is_socket() {
        FileKind::Other("socket".to_string())
    } else if ft.is_block_device() {
        FileKind::Other("block device".to_string())
    } else {
        FileKind::Other("character device".to_string())
    };
    FileInfo {
        kind,
        perm: meta.permissions().mode() & PERM_MASK,
    }
}

#[cfg(not(unix))]
fn file_info(meta: &fs::Metadata) -> FileInfo {
    let ft = meta.file_type();
    let (kind, perm) = if ft.is_symlink() {
        (FileKind::Symlink, 0o777)
    } else if ft.is_dir() {
        (FileKind::Dir, 0o777)
    } else if ft.is_file() {
        (FileKind::File, 0o666)
    } else {
        (FileKind::Other("unknown".to_string()), 0)
    };
    let perm = if meta.permissions().readonly() {
        perm & !0o222
    } else {
        perm
    };
    FileInfo {
        kind,
        perm: perm & PERM_MASK,
    }
}

#[cfg(unix)]
fn set_perm(path: &Path, perm: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(perm))
}

#[cfg(not(unix))]
fn set_perm(path: &Path, perm: u32) -> std::io::Result<()> {
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_readonly(perm & 0o222 == 0);
    fs::set_permissions(path, permissions)
}

impl CmdRunner for RealSystem {
    fn idempotent_cmd_output(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        run_invocation(invocation)
    }
}

impl System for RealSystem {
    fn stat(&self, path: &str) -> Result<Option<FileInfo>> {
        match fs::symlink_metadata(to_native(path)) {
            Ok(meta) => Ok(Some(file_info(&meta))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateError::io(path, e)),
        }
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(to_native(path)).map_err(|e| StateError::io(path, e))
    }

    fn read_link(&self, path: &str) -> Result<String> {
        fs::read_link(to_native(path))
            .map(|target| to_slash(&target))
            .map_err(|e| StateError::io(path, e))
    }

    fn write_file(&self, path: &str, contents: &[u8], perm: u32) -> Result<()> {
        let native = to_native(path);
        let dir = native
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let prefix = format!(".{}.", base_name(path));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        // Created with open(2)'s mode argument, so the process umask applies.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(perm));
        }
        let mut file = builder
            .tempfile_in(dir)
            .map_err(|e| StateError::io(path, e))?;
        file.write_all(contents)
            .map_err(|e| StateError::io(path, e))?;
        #[cfg(not(unix))]
        set_perm(file.path(), perm).map_err(|e| StateError::io(path, e))?;
        // rename(2) replaces an existing entry, including a symlink, not its target.
        file.persist(&native)
            .map_err(|e| StateError::io(path, e.error))?;
        Ok(())
    }

    fn write_symlink(&self, linkname: &str, path: &str) -> Result<()> {
        self.remove_all(path)?;
        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(to_native(linkname), to_native(path));
        #[cfg(windows)]
        let result = std::os::windows::fs::symlink_file(to_native(linkname), to_native(path));
        result.map_err(|e| StateError::io(path, e))
    }

    fn mkdir(&self, path: &str, perm: u32) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(perm);
        }
        #[cfg(not(unix))]
        let _ = perm;
        builder
            .create(to_native(path))
            .map_err(|e| StateError::io(path, e))
    }

    fn chmod(&self, path: &str, perm: u32) -> Result<()> {
        set_perm(&to_native(path), perm).map_err(|e| StateError::io(path, e))
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        fs::rename(to_native(old_path), to_native(new_path))
            .map_err(|e| StateError::io(old_path, e))
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        let native = to_native(path);
        let result = match fs::symlink_metadata(&native) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&native),
            Ok(_) => fs::remove_file(&native),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StateError::io(path, e)),
            _ => Ok(()),
        }
    }

    fn run_script(&self, name: &str, work_dir: &str, contents: &[u8]) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}.", base_name(name)))
            .tempfile()
            .map_err(|e| StateError::io(name, e))?;
        file.write_all(contents)
            .map_err(|e| StateError::io(name, e))?;
        // The handle must be closed before exec or Linux reports ETXTBSY.
        let script = file.into_temp_path();
        set_perm(&script, 0o700).map_err(|e| StateError::io(name, e))?;

        tracing::debug!(script = name, work_dir, "running script");
        let status = Command::new(&script)
            .current_dir(to_native(work_dir))
            .status()
            .map_err(|e| StateError::io(name, e))?;
        if !status.success() {
            return Err(StateError::ChildProcess {
                command: name.to_string(),
                reason: status.to_string(),
            });
        }
        Ok(())
    }

    fn walk(&self, root: &str, visit: &mut WalkFn<'_>) -> Result<()> {
        let mut entries = walkdir::WalkDir::new(to_native(root))
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
                    return Ok(());
                }
                Err(e) => {
                    let path = e.path().map_or_else(|| root.to_string(), to_slash);
                    return Err(StateError::io(path, std::io::Error::from(e)));
                }
            };
            let path = to_slash(entry.path());
            let meta = entry
                .metadata()
                .map_err(|e| StateError::io(path.clone(), std::io::Error::from(e)))?;
            let info = file_info(&meta);
            if visit(&path, &info)? == WalkAction::SkipDir && info.kind == FileKind::Dir {
                entries.skip_current_dir();
            }
        }
        Ok(())
    }

    fn persistent_state(&self) -> &dyn PersistentState {
        self.persistent_state.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::paths::abs_slash;
    #[cfg(unix)]
    use crate::perm::get_umask;
    use crate::system::RedbPersistentState;

    fn system() -> RealSystem {
        RealSystem::new(Box::new(RedbPersistentState::in_memory().unwrap()))
    }

    fn root() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let root = abs_slash(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn stat_missing_is_none() {
        let (_dir, root) = root();
        assert_eq!(system().stat(&format!("{root}/missing")).unwrap(), None);
    }

    #[test]
    fn write_then_read_file() {
        let (_dir, root) = root();
        let s = system();
        let path = format!("{root}/a.txt");
        s.write_file(&path, b"hello\n", 0o644).unwrap();
        assert_eq!(s.read_file(&path).unwrap(), b"hello\n");
        assert_eq!(s.stat(&path).unwrap().unwrap().kind, FileKind::File);
    }

    #[cfg(unix)]
    #[test]
    fn write_file_and_mkdir_honour_perm() {
        let (_dir, root) = root();
        let s = system();
        let file = format!("{root}/private");
        s.write_file(&file, b"x", 0o600).unwrap();
        assert_eq!(s.stat(&file).unwrap().unwrap().perm, 0o600);

        let dir = format!("{root}/dir");
        s.mkdir(&dir, 0o700).unwrap();
        let info = s.stat(&dir).unwrap().unwrap();
        assert_eq!(info.kind, FileKind::Dir);
        assert_eq!(info.perm, 0o700);

        s.chmod(&file, 0o640).unwrap();
        assert_eq!(s.stat(&file).unwrap().unwrap().perm, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn write_symlink_replaces_existing_entry() {
        let (_dir, root) = root();
        let s = system();
        let link = format!("{root}/link");
        s.write_file(&link, b"in the way", 0o644).unwrap();
        s.write_symlink("new", &link).unwrap();
        assert_eq!(s.stat(&link).unwrap().unwrap().kind, FileKind::Symlink);
        assert_eq!(s.read_link(&link).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn write_file_replaces_mode_of_existing_file() {
        let (_dir, root) = root();
        let s = system();
        let path = format!("{root}/f");
        s.write_file(&path, b"old", 0o600).unwrap();
        s.write_file(&path, b"new", 0o644).unwrap();
        let info = s.stat(&path).unwrap().unwrap();
        assert_eq!(info.perm, 0o644 & !get_umask());
        assert_eq!(s.read_file(&path).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn write_file_replaces_symlink_instead_of_following_it() {
        let (_dir, root) = root();
        let s = system();
        let other = format!("{root}/other");
        let link = format!("{root}/l");
        s.write_file(&other, b"untouched", 0o644).unwrap();
        s.write_symlink("other", &link).unwrap();

        s.write_file(&link, b"new", 0o644).unwrap();

        assert_eq!(s.stat(&link).unwrap().unwrap().kind, FileKind::File);
        assert_eq!(s.read_file(&link).unwrap(), b"new");
        assert_eq!(s.read_file(&other).unwrap(), b"untouched");
    }

    #[test]
    fn write_file_leaves_no_temporary_files() {
        let (_dir, root) = root();
        let s = system();
        s.write_file(&format!("{root}/a"), b"1", 0o644).unwrap();
        s.write_file(&format!("{root}/a"), b"2", 0o644).unwrap();
        let mut seen = Vec::new();
        s.walk(&root, &mut |path, _| {
            seen.push(path.to_string());
            Ok(WalkAction::Continue)
        })
        .unwrap();
        assert_eq!(seen, [format!("{root}/a")]);
    }

    #[test]
    fn remove_all_is_recursive_and_tolerates_missing() {
        let (_dir, root) = root();
        let s = system();
        let dir = format!("{root}/d");
        s.mkdir(&dir, 0o755).unwrap();
        s.write_file(&format!("{dir}/f"), b"", 0o644).unwrap();
        s.remove_all(&dir).unwrap();
        assert_eq!(s.stat(&dir).unwrap(), None);
        s.remove_all(&dir).unwrap();
    }

    #[test]
    fn rename_moves_directory() {
        let (_dir, root) = root();
        let s = system();
        s.mkdir(&format!("{root}/old"), 0o755).unwrap();
        s.rename(&format!("{root}/old"), &format!("{root}/new"))
            .unwrap();
        assert_eq!(s.stat(&format!("{root}/old")).unwrap(), None);
        assert!(s.stat(&format!("{root}/new")).unwrap().is_some());
    }

    #[test]
    fn walk_is_sorted_and_can_skip_dirs() {
        let (_dir, root) = root();
        let s = system();
        s.mkdir(&format!("{root}/b"), 0o755).unwrap();
        s.write_file(&format!("{root}/b/inner"), b"", 0o644).unwrap();
        s.mkdir(&format!("{root}/c"), 0o755).unwrap();
        s.write_file(&format!("{root}/c/inner"), b"", 0o644).unwrap();
        s.write_file(&format!("{root}/a"), b"", 0o644).unwrap();

        let mut seen = Vec::new();
        s.walk(&root, &mut |path, _info| {
            let rel = path.strip_prefix(&format!("{root}/")).unwrap().to_string();
            let action = if rel == "b" {
                WalkAction::SkipDir
            } else {
                WalkAction::Continue
            };
            seen.push(rel);
            Ok(action)
        })
        .unwrap();
        assert_eq!(seen, ["a", "b", "c", "c/inner"]);
    }

    #[test]
    fn walk_of_missing_root_visits_nothing() {
        let (_dir, root) = root();
        let mut count = 0;
        system()
            .walk(&format!("{root}/missing"), &mut |_, _| {
                count += 1;
                Ok(WalkAction::Continue)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[cfg(unix)]
    #[test]
    fn run_script_uses_work_dir() {
        let (_dir, root) = root();
        let s = system();
        s.run_script("touch", &root, b"#!/bin/sh\ntouch ran\n").unwrap();
        assert!(s.stat(&format!("{root}/ran")).unwrap().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn run_script_failure_is_child_process_error() {
        let (_dir, root) = root();
        let err = system()
            .run_script("fail", &root, b"#!/bin/sh\nexit 3\n")
            .unwrap_err();
        assert!(matches!(err, StateError::ChildProcess { .. }), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn fifo_is_reported_as_other() {
        let (_dir, root) = root();
        let path = format!("{root}/pipe");
        nix::unistd::mkfifo(
            Path::new(&path),
            nix::sys::stat::Mode::from_bits_truncate(0o600),
        )
        .unwrap();
        let info = system().stat(&path).unwrap().unwrap();
        assert_eq!(info.kind, FileKind::Other("fifo".to_string()));
    }
}
