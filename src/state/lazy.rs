//! Memoising on-demand values with a cached SHA-256.
use std::cell::{Cell, OnceCell};
use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{Result, StateError};

/// SHA-256 of `bytes`.
#[must_use]
pub fn sha256_sum(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

type Producer<'a, T> = Box<dyn FnOnce() -> Result<T> + 'a>;

/// A value computed at most once, on first access.
///
/// Both the value and any error from producing it are memoised; later
/// accesses return the same value or a clone of the same error. The SHA-256
/// of the value is memoised separately and may be supplied up front, in which
/// case [`sha256`](Self::sha256) never runs the producer.
pub struct Lazy<'a, T> {
    producer: Cell<Option<Producer<'a, T>>>,
    value: OnceCell<Result<T>>,
    sha256: OnceCell<[u8; 32]>,
}

/// Lazily produced file contents.
pub type LazyContents<'a> = Lazy<'a, Vec<u8>>;

/// Lazily produced symlink target.
pub type LazyLinkname<'a> = Lazy<'a, String>;

impl<'a, T> Lazy<'a, T> {
    /// Defer `producer` until the value is first needed.
    pub fn new(producer: impl FnOnce() -> Result<T> + 'a) -> Self {
        Self {
            producer: Cell::new(Some(Box::new(producer))),
            value: OnceCell::new(),
            sha256: OnceCell::new(),
        }
    }

    /// Like [`new`](Self::new), but with the SHA-256 already known.
    pub fn with_sha256(producer: impl FnOnce() -> Result<T> + 'a, sha256: [u8; 32]) -> Self {
        let lazy = Self::new(producer);
        let _ = lazy.sha256.set(sha256);
        lazy
    }

    /// Wrap an already computed value.
    pub fn from_value(value: T) -> Self {
        Self {
            producer: Cell::new(None),
            value: OnceCell::from(Ok(value)),
            sha256: OnceCell::new(),
        }
    }

    /// The value, producing it on first call.
    ///
    /// # Errors
    ///
    /// Returns the producer's error, identically on every call.
    pub fn get(&self) -> Result<&T> {
        self.value
            .get_or_init(|| match self.producer.take() {
                Some(producer) => producer(),
                None => Err(StateError::Parse {
                    what: "lazy value".to_string(),
                    reason: "re-entrant evaluation".to_string(),
                }),
            })
            .as_ref()
            .map_err(StateError::clone)
    }
}

impl<T: AsRef<[u8]>> Lazy<'_, T> {
    /// SHA-256 of the value's bytes.
    ///
    /// # Errors
    ///
    /// Returns the producer's error if the hash was not supplied up front and
    /// producing the value fails.
    pub fn sha256(&self) -> Result<[u8; 32]> {
        if let Some(sum) = self.sha256.get() {
            return Ok(*sum);
        }
        let sum = sha256_sum(self.get()?.as_ref());
        Ok(*self.sha256.get_or_init(|| sum))
    }
}

impl<T> fmt::Debug for Lazy<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("evaluated", &self.value.get().is_some())
            .field("sha256_known", &self.sha256.get().is_some())
            .finish()
    }
}
