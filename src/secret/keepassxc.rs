//! KeePassXC lookups via `keepassxc-cli`.
//!
//! The database password is asked for once and piped to every `show`
//! invocation. The tool version, whole entries, and single attributes are
//! memoised for the lifetime of a [`KeePassXc`].
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use super::password::PasswordPrompt;
use crate::error::{Result, StateError};
use crate::exec::{CmdRunner, Invocation};

/// First version whose `show` hides protected attributes unless asked.
const SHOW_PROTECTED_VERSION: Version = Version::new(2, 5, 1);

#[allow(clippy::unwrap_used)]
static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([^:]+): (.*)$").unwrap());

/// `[keepassxc]` configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeePassXcConfig {
    /// CLI program.
    pub command: String,
    /// Database path; required for lookups.
    pub database: String,
    /// Extra arguments placed before the database path.
    pub args: Vec<String>,
}

impl Default for KeePassXcConfig {
    fn default() -> Self {
        Self {
            command: "keepassxc-cli".to_string(),
            database: String::new(),
            args: Vec::new(),
        }
    }
}

/// Parse the output of `keepassxc-cli show`.
///
/// The first line (the entry title) is ignored; every following non-blank
/// line must be `Name: value`.
///
/// # Errors
///
/// Returns [`StateError::Parse`] for a line that is not a `Name: value` pair.
pub fn parse_show_output(output: &[u8]) -> Result<BTreeMap<String, String>> {
    let text = String::from_utf8_lossy(output);
    let mut data = BTreeMap::new();
    for line in text.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let caps = PAIR_RE.captures(line).ok_or_else(|| StateError::Parse {
            what: format!("{line:?}"),
            reason: "expected \"Name: value\"".to_string(),
        })?;
        if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
            data.insert(key.as_str().to_string(), value.as_str().to_string());
        }
    }
    Ok(data)
}

/// Memoising KeePassXC client.
pub struct KeePassXc {
    config: KeePassXcConfig,
    prompt: Box<dyn PasswordPrompt>,
    version: Option<Version>,
    password: Option<String>,
    entries: HashMap<String, BTreeMap<String, String>>,
    attributes: HashMap<(String, String), String>,
}

impl fmt::Debug for KeePassXc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeePassXc")
            .field("config", &self.config)
            .field("version", &self.version)
            .field("entries", &self.entries.len())
            .field("attributes", &self.attributes.len())
            .finish_non_exhaustive()
    }
}

impl KeePassXc {
    /// Create a client with empty caches.
    #[must_use]
    pub fn new(config: KeePassXcConfig, prompt: Box<dyn PasswordPrompt>) -> Self {
        Self {
            config,
            prompt,
            version: None,
            password: None,
            entries: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Forget the cached version, password, and lookups.
    pub fn reset(&mut self) {
        self.version = None;
        self.password = None;
        self.entries.clear();
        self.attributes.clear();
    }

    /// The tool's version, detected once with `--version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails or prints something that is not a
    /// semantic version.
    pub fn version(&mut self, runner: &dyn CmdRunner) -> Result<Version> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }
        let invocation = Invocation::new(&self.config.command).args(["--version"]);
        let output = runner
            .idempotent_cmd_output(&invocation)
            .map_err(|e| wrap(&invocation, e))?;
        let text = String::from_utf8_lossy(&output);
        let version = Version::parse(text.trim()).map_err(|e| StateError::Parse {
            what: format!("version {:?}", text.trim()),
            reason: e.to_string(),
        })?;
        tracing::debug!(%version, command = %self.config.command, "detected keepassxc-cli");
        self.version = Some(version.clone());
        Ok(version)
    }

    /// All attributes of `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::MissingConfig`] if no database is configured,
    /// or a [`StateError::Command`] describing the failed invocation.
    pub fn show(&mut self, runner: &dyn CmdRunner, entry: &str) -> Result<BTreeMap<String, String>> {
        if let Some(data) = self.entries.get(entry) {
            return Ok(data.clone());
        }
        let invocation = self.show_invocation(runner, entry, None)?;
        let output = self.run(runner, &invocation)?;
        let data = parse_show_output(&output).map_err(|e| wrap(&invocation, e))?;
        self.entries.insert(entry.to_string(), data.clone());
        Ok(data)
    }

    /// A single attribute of `entry`, trimmed.
    ///
    /// # Errors
    ///
    /// As [`Self::show`].
    pub fn attribute(&mut self, runner: &dyn CmdRunner, entry: &str, attribute: &str) -> Result<String> {
        let key = (entry.to_string(), attribute.to_string());
        if let Some(value) = self.attributes.get(&key) {
            return Ok(value.clone());
        }
        let invocation = self.show_invocation(runner, entry, Some(attribute))?;
        let output = self.run(runner, &invocation)?;
        let value = String::from_utf8_lossy(&output).trim().to_string();
        self.attributes.insert(key, value.clone());
        Ok(value)
    }

    fn show_invocation(
        &mut self,
        runner: &dyn CmdRunner,
        entry: &str,
        attribute: Option<&str>,
    ) -> Result<Invocation> {
        if self.config.database.is_empty() {
            return Err(StateError::MissingConfig("keepassxc.database".to_string()));
        }
        let mut invocation = Invocation::new(&self.config.command).args(["show"]);
        if self.version(runner)? >= SHOW_PROTECTED_VERSION {
            invocation = invocation.args(["--show-protected"]);
        }
        if let Some(attribute) = attribute {
            invocation = invocation.args(["--attributes", attribute, "--quiet"]);
        }
        Ok(invocation
            .args(self.config.args.iter().map(String::as_str))
            .args([self.config.database.as_str(), entry]))
    }

    fn run(&mut self, runner: &dyn CmdRunner, invocation: &Invocation) -> Result<Vec<u8>> {
        let password = match &self.password {
            Some(password) => password.clone(),
            None => {
                let prompt = format!("Insert password to unlock {}", self.config.database);
                let password = self
                    .prompt
                    .read_password(&prompt)
                    .map_err(|e| wrap(invocation, e))?;
                self.password = Some(password.clone());
                password
            }
        };
        let invocation = invocation.clone().stdin(format!("{password}\n").into_bytes());
        runner
            .idempotent_cmd_output(&invocation)
            .map_err(|e| wrap(&invocation, e))
    }
}

fn wrap(invocation: &Invocation, source: StateError) -> StateError {
    StateError::Command {
        command: invocation.display(),
        source: Box::new(source),
    }
}
