//! Subcommand runners.
//!
//! Each runner takes an already-resolved [`CommandSetup`] so that the same
//! code paths are exercised by the binary and by integration tests.
pub mod apply;
pub mod dump;
pub mod secret;
pub mod unmanaged;
pub mod verify;
pub mod version;

use anyhow::{Context as _, Result};
use std::path::Path;

use crate::cli::{GlobalOpts, SelectOpts};
use crate::config::{Config, Dirs};
use crate::logging::Logger;
use crate::paths::abs_slash;
use crate::reconcile::ApplyOptions;
use crate::source::SourceState;
use crate::system::{RealSystem, RedbPersistentState};

/// Resolve the configuration for a run: the config file named by
/// `--config` (or the default location), then `--source` and
/// `--destination` on top.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
pub fn load_config(global: &GlobalOpts, dirs: &Dirs) -> Result<Config> {
    let path = global.config.clone().unwrap_or_else(|| dirs.config_file());
    let mut config = Config::load(&path, dirs)?;
    if let Some(source) = &global.source {
        config.source_dir.clone_from(source);
    }
    if let Some(destination) = &global.destination {
        config.dest_dir.clone_from(destination);
    }
    Ok(config)
}

/// Shared state produced by the common command setup sequence.
#[derive(Debug)]
pub struct CommandSetup {
    /// Resolved configuration.
    pub config: Config,
    /// Source state read from `config.source_dir`.
    pub source: SourceState,
    /// Absolute forward-slash destination directory.
    pub dest_dir: String,
}

impl CommandSetup {
    /// Load configuration from the environment and read the source state.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory is unknown, the config file
    /// fails to parse, or the source directory cannot be read.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let dirs = Dirs::from_env()?;
        let config = load_config(global, &dirs)?;
        Self::from_config(config, log)
    }

    /// Read the source state named by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source directory cannot be read or the
    /// destination path cannot be resolved.
    pub fn from_config(config: Config, log: &Logger) -> Result<Self> {
        log.stage("Reading source state");
        let source = SourceState::read(&config.source_dir)
            .with_context(|| format!("reading {}", config.source_dir.display()))?;
        log.info(&format!(
            "{} entries from {}",
            source.len(),
            config.source_dir.display()
        ));
        let dest_dir = abs_slash(&config.dest_dir)?;
        log.debug(&format!("destination: {dest_dir}"));
        Ok(Self {
            config,
            source,
            dest_dir,
        })
    }

    /// Open the real backend with the configured persistent state file.
    ///
    /// When a umask is configured the process umask is set to it first, so
    /// that created entries and permission comparisons agree.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent state cannot be opened.
    pub fn open_system(&self) -> Result<RealSystem> {
        if let Some(umask) = self.config.umask {
            crate::perm::set_umask(umask.0);
        }
        let path: &Path = &self.config.persistent_state;
        let state = RedbPersistentState::open(path)
            .with_context(|| format!("opening persistent state {}", path.display()))?;
        Ok(RealSystem::new(Box::new(state)))
    }

    /// Reconciliation options for a target selection.
    #[must_use]
    pub fn apply_options(&self, select: &SelectOpts) -> ApplyOptions {
        ApplyOptions {
            include: select.include,
            recursive: select.recursive,
            umask: self.config.effective_umask(),
            keep_going: false,
            record_entry_states: false,
        }
    }
}
