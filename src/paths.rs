//! Forward-slash path helpers.
//!
//! Every path inside the engine is an absolute, `/`-separated string, even on
//! platforms whose native separator differs. Conversion to a native
//! [`PathBuf`] happens only at the backend boundary via [`to_native`].
use std::path::{Path, PathBuf};

use crate::error::{Result, StateError};

/// Convert a native path into an absolute forward-slash string.
///
/// Relative paths are resolved against the current directory. The path is
/// not required to exist.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn abs_slash(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| StateError::io(".", e))?
            .join(path)
    };
    // Resolve symlinks in the existing prefix so that walked paths and
    // joined paths agree (e.g. /tmp -> /private/tmp on macOS).
    let resolved = dunce::canonicalize(&absolute).unwrap_or(absolute);
    Ok(to_slash(&resolved))
}

/// Render a native path with forward slashes.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Convert an internal slash path to a native path.
#[must_use]
pub fn to_native(path: &str) -> PathBuf {
    if std::path::MAIN_SEPARATOR == '/' {
        PathBuf::from(path)
    } else {
        PathBuf::from(path.replace('/', std::path::MAIN_SEPARATOR_STR))
    }
}

/// Join a target name onto a directory. An empty `dir` yields `name`
/// unchanged (the dump backend works on bare target names).
#[must_use]
pub fn join_slash(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Return the parent directory of a slash path (`"."` for a bare name and
/// `"/"` for a top-level absolute path).
#[must_use]
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => path.get(..i).unwrap_or(path),
        None => ".",
    }
}

/// Return the final component of a slash path.
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Strip `dir + "/"` from the front of `path`.
///
/// # Errors
///
/// Returns [`StateError::Parse`] if `path` is not below `dir`.
pub fn trim_dir_prefix<'a>(path: &'a str, dir: &str) -> Result<&'a str> {
    let dir = dir.trim_end_matches('/');
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| StateError::Parse {
            what: path.to_string(),
            reason: format!("does not have dir prefix {dir:?}"),
        })
}
