//! Actual and target state of destination entries.
//!
//! A [`TargetStateEntry`] describes what should exist at a path; an
//! [`ActualStateEntry`] describes what does. Applying a target to an actual
//! entry through a [`System`](crate::system::System) converges the two.
pub mod actual;
pub mod entry_state;
pub mod lazy;
pub mod target;

pub use actual::ActualStateEntry;
pub use entry_state::{EntryState, HexBytes, MODE_TYPE_DIR, MODE_TYPE_SYMLINK};
pub use lazy::{Lazy, LazyContents, LazyLinkname, sha256_sum};
pub use target::{
    EntryKind, ScriptOnceState, TargetStateDir, TargetStateEntry, TargetStateFile,
    TargetStatePresent, TargetStateRenameDir, TargetStateScript, TargetStateSymlink,
    script_once_key,
};
