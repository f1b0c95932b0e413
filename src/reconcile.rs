//! Reconciliation driver.
//!
//! [`apply_args`] walks the selected target names in lexicographic order
//! (so directories precede their contents), probes each destination path
//! through a [`System`], and applies the target entry. [`unmanaged`] lists
//! destination entries the source state does not know about.
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;

use crate::error::{Result, StateError};
use crate::paths::{join_slash, trim_dir_prefix};
use crate::source::SourceState;
use crate::state::{ActualStateEntry, EntryKind, TargetStateEntry};
use crate::system::{ENTRY_STATE_BUCKET, FileKind, System, WalkAction};

bitflags! {
    /// Entry kinds a pass acts on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IncludeSet: u8 {
        /// Absent entries.
        const ABSENT = 1 << 0;
        /// Directories and directory renames.
        const DIRS = 1 << 1;
        /// Files, including create-only files.
        const FILES = 1 << 2;
        /// Scripts.
        const SCRIPTS = 1 << 3;
        /// Symlinks.
        const SYMLINKS = 1 << 4;
    }
}

impl IncludeSet {
    /// Whether entries of `kind` are included.
    #[must_use]
    pub const fn includes(self, kind: EntryKind) -> bool {
        let flag = match kind {
            EntryKind::Absent => Self::ABSENT,
            EntryKind::Dir | EntryKind::RenameDir => Self::DIRS,
            EntryKind::File | EntryKind::Present => Self::FILES,
            EntryKind::Script => Self::SCRIPTS,
            EntryKind::Symlink => Self::SYMLINKS,
        };
        self.contains(flag)
    }
}

impl Default for IncludeSet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromStr for IncludeSet {
    type Err = StateError;

    /// Parse a comma-separated list such as `"dirs,files"` or `"d,f"`.
    ///
    /// ```
    /// use dotstate::reconcile::IncludeSet;
    ///
    /// let set: IncludeSet = "dirs,f".parse().unwrap();
    /// assert_eq!(set, IncludeSet::DIRS | IncludeSet::FILES);
    /// assert_eq!("all".parse::<IncludeSet>().unwrap(), IncludeSet::all());
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        let mut set = Self::empty();
        for element in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            set |= match element {
                "all" => Self::all(),
                "none" => Self::empty(),
                "absent" | "a" => Self::ABSENT,
                "dirs" | "d" => Self::DIRS,
                "files" | "f" => Self::FILES,
                "scripts" | "s" => Self::SCRIPTS,
                "symlinks" | "l" => Self::SYMLINKS,
                _ => {
                    return Err(StateError::Parse {
                        what: format!("include set {s:?}"),
                        reason: format!("unknown element {element:?}"),
                    });
                }
            };
        }
        Ok(set)
    }
}

impl fmt::Display for IncludeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::all() {
            return f.write_str("all");
        }
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = [
            (Self::ABSENT, "absent"),
            (Self::DIRS, "dirs"),
            (Self::FILES, "files"),
            (Self::SCRIPTS, "scripts"),
            (Self::SYMLINKS, "symlinks"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        f.write_str(&names.join(","))
    }
}

/// Options for [`apply_args`].
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Entry kinds to act on; others are counted as skipped.
    pub include: IncludeSet,
    /// Also process every entry below each named target.
    pub recursive: bool,
    /// Umask used when comparing permissions.
    pub umask: u32,
    /// Continue after a failing entry and return the first error at the end.
    pub keep_going: bool,
    /// Store each applied entry's [`EntryState`](crate::state::EntryState)
    /// in the `entryState` bucket.
    pub record_entry_states: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            include: IncludeSet::all(),
            recursive: false,
            umask: crate::perm::get_umask(),
            keep_going: false,
            record_entry_states: false,
        }
    }
}

/// A cheaply clonable flag checked before each entry.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the "not cancelled" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The current entry finishes first.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` if [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Cancel this token on Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler is already installed for the process.
    pub fn cancel_on_ctrlc(&self) -> std::result::Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || token.cancel())
    }
}

/// Counters for one pass.
///
/// ```
/// use dotstate::reconcile::ApplyStats;
///
/// let stats = ApplyStats { changed: 2, already_ok: 7, scripts: 1, skipped: 0 };
/// assert_eq!(stats.summary(false), "2 changed, 7 already ok, 1 scripts");
/// assert_eq!(stats.summary(true), "2 would change, 7 already ok, 1 scripts");
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyStats {
    /// Entries that needed a change.
    pub changed: u32,
    /// Entries that already matched.
    pub already_ok: u32,
    /// Scripts processed (run, or skipped by their own run-once check).
    pub scripts: u32,
    /// Entries excluded by the include set.
    pub skipped: u32,
}

impl ApplyStats {
    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        let mut summary = format!("{} {verb}, {} already ok", self.changed, self.already_ok);
        if self.scripts > 0 {
            summary.push_str(&format!(", {} scripts", self.scripts));
        }
        if self.skipped > 0 {
            summary.push_str(&format!(", {} skipped", self.skipped));
        }
        summary
    }
}

enum Outcome {
    Changed,
    AlreadyOk,
    Script,
}

fn resolve_name(source: &SourceState, dest_dir: &str, arg: &str) -> Result<String> {
    let trimmed = arg.trim_end_matches('/');
    let name = if trimmed.starts_with('/') && !dest_dir.is_empty() {
        trim_dir_prefix(trimmed, dest_dir)
            .map_err(|_| StateError::NotManaged(arg.to_string()))?
    } else {
        trimmed.strip_prefix("./").unwrap_or(trimmed)
    };
    if source.entry(name).is_none() {
        return Err(StateError::NotManaged(arg.to_string()));
    }
    Ok(name.to_string())
}

/// Target names selected by `args`, in processing order.
///
/// # Errors
///
/// Returns [`StateError::NotManaged`] for an argument that names no source
/// entry.
pub fn select_names(
    source: &SourceState,
    dest_dir: &str,
    args: &[String],
    recursive: bool,
) -> Result<BTreeSet<String>> {
    if args.is_empty() {
        return Ok(source.entries().map(|(name, _)| name.to_string()).collect());
    }
    let mut names = BTreeSet::new();
    for arg in args {
        let name = resolve_name(source, dest_dir, arg)?;
        if recursive {
            names.extend(source.names_below(&name).map(str::to_string));
        }
        names.insert(name);
    }
    Ok(names)
}

fn apply_entry(
    system: &dyn System,
    entry: &TargetStateEntry,
    path: &str,
    options: &ApplyOptions,
) -> Result<Outcome> {
    entry.evaluate()?;
    let actual = ActualStateEntry::read(system, path)?;
    let outcome = if entry.kind() == EntryKind::Script {
        Outcome::Script
    } else if entry.equal(&actual, options.umask)? {
        Outcome::AlreadyOk
    } else {
        Outcome::Changed
    };
    entry.apply(system, &actual, options.umask)?;

    if options.record_entry_states
        && let Some(entry_state) = entry.entry_state()?
    {
        let value = serde_json::to_vec(&entry_state).map_err(|e| StateError::Parse {
            what: "entry state".to_string(),
            reason: e.to_string(),
        })?;
        system
            .persistent_state()
            .set(ENTRY_STATE_BUCKET, path.as_bytes(), &value)?;
    }
    Ok(outcome)
}

/// Apply the source entries selected by `args` to `dest_dir` through
/// `system`.
///
/// An empty `args` selects every entry. Entries are processed in
/// lexicographic order of target name. By default the first failure stops
/// the pass; with [`ApplyOptions::keep_going`] every entry is attempted and
/// the first failure is returned at the end.
///
/// # Errors
///
/// Returns [`StateError::NotManaged`] for an unknown argument,
/// [`StateError::Cancelled`] if `cancel` fires, or the first entry failure
/// wrapped in [`StateError::Target`].
pub fn apply_args(
    system: &dyn System,
    source: &SourceState,
    dest_dir: &str,
    args: &[String],
    options: &ApplyOptions,
    cancel: &CancelToken,
) -> Result<ApplyStats> {
    let names = select_names(source, dest_dir, args, options.recursive)?;
    let mut stats = ApplyStats::default();
    let mut first_error = None;

    for name in &names {
        if cancel.is_cancelled() {
            return Err(StateError::Cancelled);
        }
        let Some(entry) = source.entry(name) else {
            continue;
        };
        if !options.include.includes(entry.kind()) {
            tracing::debug!(target_name = %name, "excluded by include set");
            stats.skipped += 1;
            continue;
        }

        let path = join_slash(dest_dir, name);
        match apply_entry(system, entry, &path, options) {
            Ok(Outcome::Changed) => stats.changed += 1,
            Ok(Outcome::AlreadyOk) => {
                tracing::debug!(path = %path, "already ok");
                stats.already_ok += 1;
            }
            Ok(Outcome::Script) => stats.scripts += 1,
            Err(e) => {
                let e = e.for_target(&path);
                if !options.keep_going {
                    return Err(e);
                }
                tracing::error!("{e}");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(stats),
    }
}

/// Destination entries that are neither managed nor ignored, as target
/// names. Descent stops at unmanaged or ignored directories.
///
/// # Errors
///
/// Returns any error from walking the destination.
pub fn unmanaged(system: &dyn System, source: &SourceState, dest_dir: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    system.walk(dest_dir, &mut |path, info| {
        let name = trim_dir_prefix(path, dest_dir)?;
        let managed = source.entry(name).is_some();
        let ignored = source.ignored(name);
        if !managed && !ignored {
            names.push(name.to_string());
        }
        if info.kind == FileKind::Dir && (!managed || ignored) {
            return Ok(WalkAction::SkipDir);
        }
        Ok(WalkAction::Continue)
    })?;
    Ok(names)
}
