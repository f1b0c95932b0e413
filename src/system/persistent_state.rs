//! Bucket-partitioned key-value store.
//!
//! Each bucket is a redb table mapping byte keys to byte values. Every
//! [`PersistentState::set`] commits its own write transaction, so a value is
//! durable by the time the call returns.
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use redb::{Database, TableDefinition, TableError};

use crate::error::{Result, StateError};

/// Bucket recording which run-once scripts have executed.
pub const SCRIPT_ONCE_STATE_BUCKET: &str = "scriptOnceState";

/// Bucket recording the last applied [`EntryState`](crate::state::EntryState)
/// of each target.
pub const ENTRY_STATE_BUCKET: &str = "entryState";

/// A simple `bucket -> key -> value` store.
pub trait PersistentState: Send + Sync + fmt::Debug {
    /// Look up `key` in `bucket`. A missing bucket behaves like an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::PersistentState`] if the store cannot be read.
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` in `bucket`, creating the bucket if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::PersistentState`] if the write cannot be
    /// committed.
    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()>;
}

fn db_err(e: impl Into<redb::Error>) -> StateError {
    StateError::PersistentState(e.into().to_string())
}

const fn table(bucket: &str) -> TableDefinition<'_, &'static [u8], &'static [u8]> {
    TableDefinition::new(bucket)
}

/// A [`PersistentState`] backed by a single redb file (or memory).
pub struct RedbPersistentState {
    db: Database,
    location: String,
}

impl RedbPersistentState {
    /// Open or create the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::PersistentState`] if the file cannot be opened,
    /// and [`StateError::Io`] if its parent directory cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StateError::io(parent.display().to_string(), e))?;
        }
        let db = Database::create(path).map_err(db_err)?;
        Ok(Self {
            db,
            location: path.display().to_string(),
        })
    }

    /// Create a store that lives only as long as this value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::PersistentState`] if the backend cannot be
    /// initialised.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(db_err)?;
        Ok(Self {
            db,
            location: ":memory:".to_string(),
        })
    }
}

impl fmt::Debug for RedbPersistentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedbPersistentState")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl PersistentState for RedbPersistentState {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = match txn.open_table(table(bucket)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(db_err(e)),
        };
        let value = table.get(key).map_err(db_err)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(table(bucket)).map_err(db_err)?;
            table.insert(key, value).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)
    }
}

type Overlay = BTreeMap<(String, Vec<u8>), Vec<u8>>;

/// Overlay used during dry runs: reads fall through to the wrapped store,
/// writes are kept in memory and never reach it.
#[derive(Debug)]
pub struct DryRunPersistentState<'a> {
    base: &'a dyn PersistentState,
    overlay: Mutex<Overlay>,
}

impl<'a> DryRunPersistentState<'a> {
    /// Wrap `base`.
    #[must_use]
    pub fn new(base: &'a dyn PersistentState) -> Self {
        Self {
            base,
            overlay: Mutex::new(BTreeMap::new()),
        }
    }

    fn overlay(&self) -> Result<std::sync::MutexGuard<'_, Overlay>> {
        self.overlay
            .lock()
            .map_err(|_| StateError::PersistentState("dry-run overlay poisoned".to_string()))
    }
}

impl PersistentState for DryRunPersistentState<'_> {
    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.overlay()?.get(&(bucket.to_string(), key.to_vec())) {
            return Ok(Some(value.clone()));
        }
        self.base.get(bucket, key)
    }

    fn set(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.overlay()?
            .insert((bucket.to_string(), key.to_vec()), value.to_vec());
        Ok(())
    }
}
