//! User configuration: where the source state lives, where it is applied,
//! and how external tools are invoked.
pub mod toml_loader;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::perm::Umask;
use crate::secret::KeePassXcConfig;

/// Config file name under `$XDG_CONFIG_HOME/dotstate/`.
pub const CONFIG_FILE_NAME: &str = "dotstate.toml";

/// Persistent state file name under `$XDG_CONFIG_HOME/dotstate/`.
pub const PERSISTENT_STATE_FILE_NAME: &str = "dotstate.redb";

/// Output format for `dump`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// TOML.
    Toml,
}

/// Base directories the defaults are derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirs {
    /// The user's home directory.
    pub home: PathBuf,
    /// `$XDG_CONFIG_HOME`, or `~/.config`.
    pub config_home: PathBuf,
    /// `$XDG_DATA_HOME`, or `~/.local/share`.
    pub data_home: PathBuf,
}

impl Dirs {
    /// Derive the XDG directories from `home` alone.
    #[must_use]
    pub fn from_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            config_home: home.join(".config"),
            data_home: home.join(".local").join("share"),
            home,
        }
    }

    /// Read `HOME` and the XDG variables from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `HOME` nor `USERPROFILE` is set.
    pub fn from_env() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| anyhow!("HOME environment variable is not set"))?;
        let mut dirs = Self::from_home(home);
        if let Some(v) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            dirs.config_home = PathBuf::from(v);
        }
        if let Some(v) = std::env::var_os("XDG_DATA_HOME").filter(|v| !v.is_empty()) {
            dirs.data_home = PathBuf::from(v);
        }
        Ok(dirs)
    }

    /// Default config file location.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_home.join("dotstate").join(CONFIG_FILE_NAME)
    }
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    source_dir: Option<PathBuf>,
    dest_dir: Option<PathBuf>,
    umask: Option<Umask>,
    persistent_state: Option<PathBuf>,
    format: Option<OutputFormat>,
    keepassxc: KeePassXcConfig,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory the source state is read from.
    pub source_dir: PathBuf,
    /// Directory the source state is applied to.
    pub dest_dir: PathBuf,
    /// Umask to apply with; the process umask when unset.
    pub umask: Option<Umask>,
    /// Key-value store for script-once and entry state.
    pub persistent_state: PathBuf,
    /// Default `dump` format.
    pub format: OutputFormat,
    /// KeePassXC integration.
    pub keepassxc: KeePassXcConfig,
}

impl Config {
    /// Configuration with every key at its default.
    #[must_use]
    pub fn defaults(dirs: &Dirs) -> Self {
        Self {
            source_dir: dirs.data_home.join("dotstate"),
            dest_dir: dirs.home.clone(),
            umask: None,
            persistent_state: dirs.config_home.join("dotstate").join(PERSISTENT_STATE_FILE_NAME),
            format: OutputFormat::default(),
            keepassxc: KeePassXcConfig::default(),
        }
    }

    /// Load `path` over the defaults. A missing file yields the defaults.
    /// Paths starting with `~/` are expanded against the home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path, dirs: &Dirs) -> Result<Self> {
        let file: ConfigFile = toml_loader::load_config(path)?;
        let defaults = Self::defaults(dirs);
        let expand = |p: PathBuf| expand_tilde(p, &dirs.home);
        Ok(Self {
            source_dir: file.source_dir.map_or(defaults.source_dir, expand),
            dest_dir: file.dest_dir.map_or(defaults.dest_dir, expand),
            umask: file.umask,
            persistent_state: file.persistent_state.map_or(defaults.persistent_state, expand),
            format: file.format.unwrap_or(defaults.format),
            keepassxc: KeePassXcConfig {
                database: expand_tilde(PathBuf::from(&file.keepassxc.database), &dirs.home)
                    .to_string_lossy()
                    .into_owned(),
                ..file.keepassxc
            },
        })
    }

    /// The umask to apply and compare with.
    #[must_use]
    pub fn effective_umask(&self) -> u32 {
        self.umask.unwrap_or_else(Umask::current).0
    }
}

/// Replace a leading `~` component with `home`.
#[must_use]
pub fn expand_tilde(path: PathBuf, home: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path,
    }
}
