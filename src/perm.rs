//! Permission bits and umask handling.
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, StateError};

/// Mask of the permission bits the engine manages (setuid/setgid/sticky +
/// rwx for user, group and other).
pub const PERM_MASK: u32 = 0o7777;

/// Returns `true` if two permissions are equal once `umask` is applied.
#[must_use]
pub const fn umask_perm_equal(perm1: u32, perm2: u32, umask: u32) -> bool {
    perm1 & !umask == perm2 & !umask
}

/// Returns `true` if any execute bit is set.
#[must_use]
pub const fn is_executable(perm: u32) -> bool {
    perm & 0o111 != 0
}

/// Returns `true` if no group or other bits are set.
#[must_use]
pub const fn is_private(perm: u32) -> bool {
    perm & 0o077 == 0
}

/// Parse an octal permission string such as `"022"` or `"0o644"`.
///
/// # Errors
///
/// Returns [`StateError::Parse`] if the string is not octal or exceeds
/// [`PERM_MASK`].
pub fn parse_octal(s: &str) -> Result<u32> {
    let digits = s.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let value = u32::from_str_radix(digits, 8).map_err(|e| StateError::Parse {
        what: format!("mode {s:?}"),
        reason: e.to_string(),
    })?;
    if value & !PERM_MASK != 0 {
        return Err(StateError::Parse {
            what: format!("mode {s:?}"),
            reason: "out of range".to_string(),
        });
    }
    Ok(value)
}

/// Return the current process umask.
#[cfg(unix)]
#[must_use]
pub fn get_umask() -> u32 {
    use nix::sys::stat::{Mode, umask};
    // umask(2) can only be read by setting it, so restore immediately.
    let old = umask(Mode::empty());
    umask(old);
    u32::from(old.bits())
}

/// Return the current process umask.
#[cfg(not(unix))]
#[must_use]
pub const fn get_umask() -> u32 {
    0o022
}

/// Set the process umask.
#[cfg(unix)]
pub fn set_umask(value: u32) {
    use nix::sys::stat::{Mode, umask};
    // mode_t is u16 on some targets; the masked value always fits.
    #[allow(trivial_numeric_casts, clippy::cast_possible_truncation)]
    umask(Mode::from_bits_truncate((value & PERM_MASK) as nix::libc::mode_t));
}

/// Set the process umask.
#[cfg(not(unix))]
pub const fn set_umask(_value: u32) {}

/// A umask value that (de)serialises as an octal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Umask(pub u32);

impl Umask {
    /// The umask of the running process.
    #[must_use]
    pub fn current() -> Self {
        Self(get_umask())
    }
}

impl std::fmt::Display for Umask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03o}", self.0)
    }
}

impl std::str::FromStr for Umask {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self> {
        parse_octal(s).map(Self)
    }
}

impl Serialize for Umask {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Umask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
