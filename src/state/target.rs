//! Desired state of a destination path and how to reach it.
use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

use super::actual::ActualStateEntry;
use super::entry_state::{EntryState, HexBytes, MODE_TYPE_DIR, MODE_TYPE_SYMLINK};
use super::lazy::{LazyContents, LazyLinkname};
use crate::error::{Result, StateError};
use crate::paths::{join_slash, parent_dir};
use crate::perm::umask_perm_equal;
use crate::system::{SCRIPT_ONCE_STATE_BUCKET, System};

/// The kind of a [`TargetStateEntry`], used for include filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// [`TargetStateEntry::Absent`].
    Absent,
    /// [`TargetStateEntry::Dir`].
    Dir,
    /// [`TargetStateEntry::File`].
    File,
    /// [`TargetStateEntry::Present`].
    Present,
    /// [`TargetStateEntry::RenameDir`].
    RenameDir,
    /// [`TargetStateEntry::Script`].
    Script,
    /// [`TargetStateEntry::Symlink`].
    Symlink,
}

/// A directory with the given permissions. Contents are separate entries.
#[derive(Debug)]
pub struct TargetStateDir {
    /// Permission bits.
    pub perm: u32,
}

/// A regular file with exact contents.
#[derive(Debug)]
pub struct TargetStateFile {
    /// Permission bits.
    pub perm: u32,
    /// Desired contents.
    pub contents: LazyContents<'static>,
}

/// A regular file that must exist; its contents are only used to create it.
#[derive(Debug)]
pub struct TargetStatePresent {
    /// Permission bits.
    pub perm: u32,
    /// Contents written when the file is created.
    pub contents: LazyContents<'static>,
}

/// Rename a directory within the parent of the entry's path.
#[derive(Debug)]
pub struct TargetStateRenameDir {
    /// Current name.
    pub old_name: String,
    /// New name.
    pub new_name: String,
}

/// A script to run, optionally only once per distinct contents.
#[derive(Debug)]
pub struct TargetStateScript {
    /// Script name, used for the temporary file and diagnostics.
    pub name: String,
    /// Script source.
    pub contents: LazyContents<'static>,
    /// Run only if these exact contents have never run before.
    pub once: bool,
}

/// A symbolic link.
#[derive(Debug)]
pub struct TargetStateSymlink {
    /// Desired link target.
    pub linkname: LazyLinkname<'static>,
}

/// Desired state of one destination path.
#[derive(Debug)]
pub enum TargetStateEntry {
    /// Nothing should exist.
    Absent,
    /// A directory.
    Dir(TargetStateDir),
    /// A regular file with exact contents.
    File(TargetStateFile),
    /// A regular file that must exist.
    Present(TargetStatePresent),
    /// A directory rename.
    RenameDir(TargetStateRenameDir),
    /// A script.
    Script(TargetStateScript),
    /// A symbolic link.
    Symlink(TargetStateSymlink),
}

/// Record of a run-once script, stored in the `scriptOnceState` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOnceState {
    /// Script name.
    pub name: String,
    /// When the script ran.
    pub run_at: DateTime<Utc>,
}

/// Bucket key for a run-once script: lowercase hex of the contents' SHA-256.
#[must_use]
pub fn script_once_key(contents_sha256: &[u8; 32]) -> String {
    HEXLOWER.encode(contents_sha256)
}

/// Whether `contents` is only Unicode whitespace. Invalid UTF-8 counts as
/// content.
fn is_empty_script(contents: &[u8]) -> bool {
    String::from_utf8_lossy(contents).trim().is_empty()
}

impl TargetStateEntry {
    /// The entry's kind.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        match self {
            Self::Absent => EntryKind::Absent,
            Self::Dir(_) => EntryKind::Dir,
            Self::File(_) => EntryKind::File,
            Self::Present(_) => EntryKind::Present,
            Self::RenameDir(_) => EntryKind::RenameDir,
            Self::Script(_) => EntryKind::Script,
            Self::Symlink(_) => EntryKind::Symlink,
        }
    }

    /// Update `actual` to match this entry. Directories are not recursed
    /// into.
    ///
    /// # Errors
    ///
    /// Returns the first error from producing contents, probing the actual
    /// entry, or the backend.
    pub fn apply(&self, system: &dyn System, actual: &ActualStateEntry<'_>, umask: u32) -> Result<()> {
        match self {
            Self::Absent => actual.remove(system),
            Self::Dir(dir) => {
                if let ActualStateEntry::Dir { path, perm } = actual {
                    if umask_perm_equal(*perm, dir.perm, umask) {
                        return Ok(());
                    }
                    return system.chmod(path, dir.perm & !umask);
                }
                actual.remove(system)?;
                system.mkdir(actual.path(), dir.perm)
            }
            Self::File(file) => {
                if let ActualStateEntry::File { path, perm, contents } = actual
                    && contents.sha256()? == file.contents.sha256()?
                {
                    if umask_perm_equal(*perm, file.perm, umask) {
                        return Ok(());
                    }
                    return system.chmod(path, file.perm & !umask);
                }
                let contents = file.contents.get()?;
                actual.remove(system)?;
                system.write_file(actual.path(), contents, file.perm)
            }
            Self::Present(present) => {
                if let ActualStateEntry::File { path, perm, .. } = actual {
                    if umask_perm_equal(*perm, present.perm, umask) {
                        return Ok(());
                    }
                    return system.chmod(path, present.perm & !umask);
                }
                let contents = present.contents.get()?;
                actual.remove(system)?;
                system.write_file(actual.path(), contents, present.perm)
            }
            Self::RenameDir(rename) => {
                let dir = parent_dir(actual.path());
                system.rename(
                    &join_slash(dir, &rename.old_name),
                    &join_slash(dir, &rename.new_name),
                )
            }
            Self::Script(script) => script.run(system, actual.path()),
            Self::Symlink(symlink) => {
                let linkname = symlink.linkname.get()?;
                if let ActualStateEntry::Symlink {
                    linkname: actual_linkname,
                    ..
                } = actual
                    && actual_linkname.get()? == linkname
                {
                    return Ok(());
                }
                actual.remove(system)?;
                system.write_symlink(linkname, actual.path())
            }
        }
    }

    /// Whether `actual` already matches this entry.
    ///
    /// # Errors
    ///
    /// Returns an error if contents or link targets cannot be produced.
    pub fn equal(&self, actual: &ActualStateEntry<'_>, umask: u32) -> Result<bool> {
        Ok(match (self, actual) {
            (Self::Absent, actual) => actual.is_absent(),
            (Self::Dir(dir), ActualStateEntry::Dir { perm, .. }) => {
                umask_perm_equal(*perm, dir.perm, umask)
            }
            (Self::File(file), ActualStateEntry::File { perm, contents, .. }) => {
                umask_perm_equal(*perm, file.perm, umask)
                    && contents.sha256()? == file.contents.sha256()?
            }
            (Self::Present(present), ActualStateEntry::File { perm, .. }) => {
                umask_perm_equal(*perm, present.perm, umask)
            }
            (Self::Script(_), _) => true,
            (Self::Symlink(symlink), ActualStateEntry::Symlink { linkname, .. }) => {
                linkname.get()? == symlink.linkname.get()?
            }
            _ => false,
        })
    }

    /// The persistable summary of this entry, if it has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the contents or link target cannot be produced.
    pub fn entry_state(&self) -> Result<Option<EntryState>> {
        Ok(match self {
            Self::Dir(dir) => Some(EntryState {
                mode: MODE_TYPE_DIR | dir.perm,
                contents_sha256: HexBytes::default(),
            }),
            Self::File(file) => Some(EntryState {
                mode: file.perm,
                contents_sha256: file.contents.sha256()?.into(),
            }),
            Self::Symlink(symlink) => Some(EntryState {
                mode: MODE_TYPE_SYMLINK,
                contents_sha256: symlink.linkname.sha256()?.into(),
            }),
            Self::Absent | Self::Present(_) | Self::RenameDir(_) | Self::Script(_) => None,
        })
    }

    /// Force any lazy contents so that production errors surface before
    /// anything is modified.
    ///
    /// # Errors
    ///
    /// Returns the production error, if any.
    pub fn evaluate(&self) -> Result<()> {
        match self {
            Self::File(TargetStateFile { contents, .. })
            | Self::Present(TargetStatePresent { contents, .. })
            | Self::Script(TargetStateScript { contents, .. }) => contents.sha256().map(drop),
            Self::Symlink(symlink) => symlink.linkname.get().map(drop),
            Self::Absent | Self::Dir(_) | Self::RenameDir(_) => Ok(()),
        }
    }
}

impl TargetStateScript {
    fn run(&self, system: &dyn System, path: &str) -> Result<()> {
        let mut once_key = None;
        if self.once {
            let key = script_once_key(&self.contents.sha256()?);
            if system
                .persistent_state()
                .get(SCRIPT_ONCE_STATE_BUCKET, key.as_bytes())?
                .is_some()
            {
                tracing::debug!(script = %self.name, "already run, skipping");
                return Ok(());
            }
            once_key = Some((key, Utc::now()));
        }

        let contents = self.contents.get()?;
        if is_empty_script(contents) {
            return Ok(());
        }
        system.run_script(&self.name, parent_dir(path), contents)?;

        if let Some((key, run_at)) = once_key {
            let record = ScriptOnceState {
                name: self.name.clone(),
                run_at,
            };
            let value = serde_json::to_vec(&record).map_err(|e| StateError::Parse {
                what: "script once state".to_string(),
                reason: e.to_string(),
            })?;
            system
                .persistent_state()
                .set(SCRIPT_ONCE_STATE_BUCKET, key.as_bytes(), &value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::paths::abs_slash;
    use crate::state::lazy::{Lazy, sha256_sum};
    use crate::system::{DryRunSystem, RealSystem, RedbPersistentState};

    const UMASK: u32 = 0o022;

    fn setup() -> (tempfile::TempDir, String, RealSystem) {
        let dir = tempfile::tempdir().unwrap();
        let root = abs_slash(dir.path()).unwrap();
        let system = RealSystem::new(Box::new(RedbPersistentState::in_memory().unwrap()));
        (dir, root, system)
    }

    fn file(contents: &[u8], perm: u32) -> TargetStateEntry {
        TargetStateEntry::File(TargetStateFile {
            perm,
            contents: Lazy::from_value(contents.to_vec()),
        })
    }

    fn symlink(linkname: &str) -> TargetStateEntry {
        TargetStateEntry::Symlink(TargetStateSymlink {
            linkname: Lazy::from_value(linkname.to_string()),
        })
    }

    fn script(contents: &str, once: bool) -> TargetStateEntry {
        TargetStateEntry::Script(TargetStateScript {
            name: "setup".to_string(),
            contents: Lazy::from_value(contents.as_bytes().to_vec()),
            once,
        })
    }

    /// Apply, then check that the result is equal and that a second apply
    /// through a dry-run wrapper wants no changes.
    fn apply_and_check(system: &RealSystem, target: &TargetStateEntry, path: &str) {
        let actual = ActualStateEntry::read(system, path).unwrap();
        target.apply(system, &actual, UMASK).unwrap();

        let actual = ActualStateEntry::read(system, path).unwrap();
        assert!(target.equal(&actual, UMASK).unwrap(), "{path} not equal after apply");

        let dry = DryRunSystem::new(system);
        let actual = ActualStateEntry::read(&dry, path).unwrap();
        target.apply(&dry, &actual, UMASK).unwrap();
        assert!(!dry.modified(), "{path}: second apply modified");
    }

    #[test]
    fn file_install_new() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/a.txt");
        apply_and_check(&system, &file(b"hello\n", 0o644), &path);
        assert_eq!(system.read_file(&path).unwrap(), b"hello\n");
        #[cfg(unix)]
        assert_eq!(system.stat(&path).unwrap().unwrap().perm & !UMASK, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn file_permission_only_change_uses_chmod() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/b");
        system.write_file(&path, b"x", 0o600).unwrap();
        let target = file(b"x", 0o644);

        let dry = DryRunSystem::new(&system);
        let actual = ActualStateEntry::read(&dry, &path).unwrap();
        assert!(!target.equal(&actual, UMASK).unwrap());

        // A hard link shares the inode, so it only sees the new mode if the
        // file was chmodded in place rather than replaced.
        let alias = format!("{root}/b-alias");
        std::fs::hard_link(&path, &alias).unwrap();
        let actual = ActualStateEntry::read(&system, &path).unwrap();
        target.apply(&system, &actual, UMASK).unwrap();
        assert_eq!(system.stat(&path).unwrap().unwrap().perm, 0o644);
        assert_eq!(system.stat(&alias).unwrap().unwrap().perm, 0o644);
        assert_eq!(system.read_file(&path).unwrap(), b"x");
    }

    #[cfg(unix)]
    #[test]
    fn permission_only_change_applies_umask() {
        let (_dir, root, system) = setup();
        let file_path = format!("{root}/.bashrc");
        let dir_path = format!("{root}/.config");
        system.write_file(&file_path, b"x", 0o600).unwrap();
        system.mkdir(&dir_path, 0o700).unwrap();

        apply_and_check(&system, &file(b"x", 0o666), &file_path);
        apply_and_check(
            &system,
            &TargetStateEntry::Dir(TargetStateDir { perm: 0o777 }),
            &dir_path,
        );

        assert_eq!(system.stat(&file_path).unwrap().unwrap().perm, 0o644);
        assert_eq!(system.stat(&dir_path).unwrap().unwrap().perm, 0o755);
    }

    #[test]
    fn file_with_different_contents_is_rewritten() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/c");
        system.write_file(&path, b"old", 0o644).unwrap();
        apply_and_check(&system, &file(b"new", 0o644), &path);
        assert_eq!(system.read_file(&path).unwrap(), b"new");
    }

    #[test]
    fn file_replaces_directory() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/d");
        system.mkdir(&path, 0o755).unwrap();
        system.write_file(&format!("{path}/inner"), b"", 0o644).unwrap();
        apply_and_check(&system, &file(b"flat", 0o644), &path);
    }

    #[test]
    fn dir_is_created_and_chmodded() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/d");
        let target = TargetStateEntry::Dir(TargetStateDir { perm: 0o755 });
        apply_and_check(&system, &target, &path);

        #[cfg(unix)]
        {
            let private = TargetStateEntry::Dir(TargetStateDir { perm: 0o700 });
            apply_and_check(&system, &private, &path);
            assert_eq!(system.stat(&path).unwrap().unwrap().perm, 0o700);
        }
    }

    #[test]
    fn absent_removes_and_is_then_equal() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/gone");
        system.write_file(&path, b"", 0o644).unwrap();
        apply_and_check(&system, &TargetStateEntry::Absent, &path);
        assert_eq!(system.stat(&path).unwrap(), None);
    }

    #[test]
    fn present_does_not_overwrite_contents() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/p");
        system.write_file(&path, b"user edits", 0o644).unwrap();
        let target = TargetStateEntry::Present(TargetStatePresent {
            perm: 0o644,
            contents: Lazy::from_value(b"initial".to_vec()),
        });
        apply_and_check(&system, &target, &path);
        assert_eq!(system.read_file(&path).unwrap(), b"user edits");
    }

    #[test]
    fn present_creates_missing_file() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/p");
        let target = TargetStateEntry::Present(TargetStatePresent {
            perm: 0o644,
            contents: Lazy::from_value(b"initial".to_vec()),
        });
        apply_and_check(&system, &target, &path);
        assert_eq!(system.read_file(&path).unwrap(), b"initial");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_replaced() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/link");
        system.write_symlink("old", &path).unwrap();
        apply_and_check(&system, &symlink("new"), &path);
        assert_eq!(system.read_link(&path).unwrap(), "new");
    }

    #[test]
    fn rename_dir_renames_within_parent_and_is_never_equal() {
        let (_dir, root, system) = setup();
        system.mkdir(&format!("{root}/old"), 0o755).unwrap();
        let target = TargetStateEntry::RenameDir(TargetStateRenameDir {
            old_name: "old".to_string(),
            new_name: "new".to_string(),
        });
        let actual = ActualStateEntry::read(&system, &format!("{root}/old")).unwrap();
        assert!(!target.equal(&actual, UMASK).unwrap());
        target.apply(&system, &actual, UMASK).unwrap();
        assert!(system.stat(&format!("{root}/new")).unwrap().is_some());
        assert_eq!(system.stat(&format!("{root}/old")).unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn script_once_runs_once_per_contents() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/setup");
        let contents = "#!/bin/sh\necho hi >> log\n";
        let target = script(contents, true);

        for _ in 0..2 {
            let actual = ActualStateEntry::read(&system, &path).unwrap();
            target.apply(&system, &actual, UMASK).unwrap();
        }
        assert_eq!(system.read_file(&format!("{root}/log")).unwrap(), b"hi\n");

        let key = script_once_key(&sha256_sum(contents.as_bytes()));
        let stored = system
            .persistent_state()
            .get(SCRIPT_ONCE_STATE_BUCKET, key.as_bytes())
            .unwrap()
            .unwrap();
        let record: ScriptOnceState = serde_json::from_slice(&stored).unwrap();
        assert_eq!(record.name, "setup");

        let changed = script("#!/bin/sh\necho hi! >> log\n", true);
        let actual = ActualStateEntry::read(&system, &path).unwrap();
        changed.apply(&system, &actual, UMASK).unwrap();
        assert_eq!(
            system.read_file(&format!("{root}/log")).unwrap(),
            b"hi\nhi!\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn script_without_once_runs_every_time() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/setup");
        let target = script("#!/bin/sh\necho x >> log\n", false);
        for _ in 0..2 {
            let actual = ActualStateEntry::read(&system, &path).unwrap();
            target.apply(&system, &actual, UMASK).unwrap();
        }
        assert_eq!(system.read_file(&format!("{root}/log")).unwrap(), b"x\nx\n");
    }

    #[test]
    fn whitespace_only_script_is_not_run() {
        let (_dir, root, system) = setup();
        let path = format!("{root}/setup");
        let dry = DryRunSystem::new(&system);
        let actual = ActualStateEntry::read(&dry, &path).unwrap();
        script(" \n\t\n", true).apply(&dry, &actual, UMASK).unwrap();
        assert!(!dry.modified());
    }

    #[test]
    fn empty_script_detection_uses_unicode_whitespace() {
        assert!(is_empty_script(b""));
        assert!(is_empty_script(" \u{a0}\u{2028}\r\n".as_bytes()));
        assert!(!is_empty_script(b" echo \n"));
        assert!(!is_empty_script(b"\xff"));
    }

    #[test]
    fn script_is_always_equal() {
        let (_dir, root, system) = setup();
        let actual = ActualStateEntry::read(&system, &format!("{root}/x")).unwrap();
        assert!(script("echo", true).equal(&actual, UMASK).unwrap());
    }

    #[test]
    fn entry_states() {
        assert_eq!(TargetStateEntry::Absent.entry_state().unwrap(), None);
        assert_eq!(
            TargetStateEntry::Dir(TargetStateDir { perm: 0o755 })
                .entry_state()
                .unwrap(),
            Some(EntryState {
                mode: MODE_TYPE_DIR | 0o755,
                contents_sha256: HexBytes::default(),
            })
        );
        assert_eq!(
            file(b"hello\n", 0o644).entry_state().unwrap(),
            Some(EntryState {
                mode: 0o644,
                contents_sha256: sha256_sum(b"hello\n").into(),
            })
        );
        assert_eq!(
            symlink("t").entry_state().unwrap(),
            Some(EntryState {
                mode: MODE_TYPE_SYMLINK,
                contents_sha256: sha256_sum(b"t").into(),
            })
        );
        assert_eq!(script("echo", true).entry_state().unwrap(), None);
    }

    #[test]
    fn evaluate_surfaces_production_errors() {
        let target = TargetStateEntry::File(TargetStateFile {
            perm: 0o644,
            contents: Lazy::new(|| Err(StateError::MissingConfig("keepassxc.database".to_string()))),
        });
        let err = target.evaluate().unwrap_err();
        assert_eq!(err.to_string(), "keepassxc.database not set");
    }

    #[test]
    fn script_once_state_json_shape() {
        let record = ScriptOnceState {
            name: "setup".to_string(),
            run_at: DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"name":"setup","runAt":"2024-01-02T03:04:05Z"}"#
        );
    }

    #[test]
    fn script_once_state_round_trips_through_json() {
        let record = ScriptOnceState {
            name: "install-packages".to_string(),
            run_at: DateTime::parse_from_rfc3339("2024-06-30T23:59:59.123456789+02:00")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_vec(&record).unwrap();
        let back: ScriptOnceState = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.run_at.timestamp_subsec_nanos(), 123_456_789);
    }
}
