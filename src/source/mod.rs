//! The source state: every managed target name and its desired entry.
mod reader;

use std::collections::BTreeMap;
use std::ops::Bound;

use glob::{MatchOptions, Pattern};

use crate::error::{Result, StateError};
use crate::state::TargetStateEntry;

pub use reader::{IGNORE_FILE_NAME, REMOVE_FILE_NAME};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Managed target names mapped to their desired state, plus ignore patterns.
///
/// Target names are relative, forward-slash paths such as `.config/git/config`.
/// A source state is not modified while a reconciliation pass runs over it.
#[derive(Debug, Default)]
pub struct SourceState {
    entries: BTreeMap<String, TargetStateEntry>,
    ignore: Vec<Pattern>,
}

impl SourceState {
    /// Create an empty source state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::DuplicateTarget`] if `name` is already present.
    pub fn insert(&mut self, name: impl Into<String>, entry: TargetStateEntry) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(StateError::DuplicateTarget {
                first: name.clone(),
                second: name.clone(),
                target: name,
            });
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Add an ignore glob. `*` does not match `/`; `**` matches any depth.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Parse`] if `pattern` is not a valid glob.
    pub fn add_ignore(&mut self, pattern: &str) -> Result<()> {
        let compiled = Pattern::new(pattern).map_err(|e| StateError::Parse {
            what: format!("ignore pattern {pattern:?}"),
            reason: e.to_string(),
        })?;
        self.ignore.push(compiled);
        Ok(())
    }

    /// All entries in lexicographic order of target name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &TargetStateEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Look up an entry by target name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&TargetStateEntry> {
        self.entries.get(name)
    }

    /// Whether `name` matches an ignore pattern.
    #[must_use]
    pub fn ignored(&self, name: &str) -> bool {
        self.ignore
            .iter()
            .any(|pattern| pattern.matches_with(name, MATCH_OPTIONS))
    }

    /// Target names strictly below `dir`, in order.
    pub fn names_below<'a>(&'a self, dir: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        let prefix = format!("{dir}/");
        self.entries
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .map(|(name, _)| name.as_str())
            .take_while(move |name| name.starts_with(&prefix))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
