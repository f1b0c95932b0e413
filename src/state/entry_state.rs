//! Persistable summary of an entry.
use std::fmt;

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `st_mode` type bits for a directory.
pub const MODE_TYPE_DIR: u32 = 0o040_000;

/// `st_mode` type bits for a symbolic link.
pub const MODE_TYPE_SYMLINK: u32 = 0o120_000;

/// Bytes that serialise as a lowercase hex string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HexBytes(pub Vec<u8>);

impl HexBytes {
    /// Whether there are no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<[u8; 32]> for HexBytes {
    fn from(sum: [u8; 32]) -> Self {
        Self(sum.to_vec())
    }
}

impl fmt::Display for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&HEXLOWER.encode(&self.0))
    }
}

impl Serialize for HexBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&HEXLOWER.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        HEXLOWER_PERMISSIVE
            .decode(s.as_bytes())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// What was last applied at a path: mode (including type bits) and, for
/// files and symlinks, the SHA-256 of the contents or link target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryState {
    /// File mode, including `st_mode` type bits for directories and symlinks.
    pub mode: u32,
    /// SHA-256 of the contents; empty for directories.
    #[serde(
        rename = "contentsSHA256",
        default,
        skip_serializing_if = "HexBytes::is_empty"
    )]
    pub contents_sha256: HexBytes,
}
