// Shared helpers for integration tests.
//
// Provides a temporary directory holding a source tree, a destination
// ("home") directory, and a persistent state file, plus a fluent builder so
// each integration test can set up an isolated environment without
// repeating filesystem boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dotstate::commands::CommandSetup;
use dotstate::config::{Config, Dirs};
use dotstate::logging::Logger;
use dotstate::perm::Umask;

/// An isolated source/destination pair backed by a [`tempfile::TempDir`].
pub struct IntegrationTestContext {
    /// Temporary directory containing `source/`, `home/`, and `state/`.
    pub root: tempfile::TempDir,
}

impl IntegrationTestContext {
    /// Create a new context with empty source and destination directories.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("source")).expect("create source dir");
        std::fs::create_dir_all(root.path().join("home")).expect("create home dir");
        Self { root }
    }

    /// The source directory.
    pub fn source(&self) -> PathBuf {
        self.root.path().join("source")
    }

    /// The destination directory.
    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    /// A path inside the destination directory.
    pub fn home_path(&self, name: &str) -> PathBuf {
        self.home().join(name)
    }

    /// Configuration pointing at this context, with a fixed `022` umask.
    pub fn config(&self) -> Config {
        let mut config = Config::defaults(&Dirs::from_home(self.home()));
        config.source_dir = self.source();
        config.dest_dir = self.home();
        config.persistent_state = self.root.path().join("state").join("dotstate.redb");
        config.umask = Some(Umask(0o022));
        config
    }

    /// Read the source state and resolve the destination.
    pub fn setup(&self) -> CommandSetup {
        CommandSetup::from_config(self.config(), &Logger::default()).expect("command setup")
    }
}

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(&path, contents).expect("write file");
}

/// Fluent builder for [`IntegrationTestContext`].
pub struct TestContextBuilder {
    ctx: IntegrationTestContext,
}

impl TestContextBuilder {
    /// Begin building a new, empty context.
    pub fn new() -> Self {
        Self {
            ctx: IntegrationTestContext::new(),
        }
    }

    /// Add a file to the source directory.
    pub fn with_source_file(self, rel: &str, contents: &str) -> Self {
        write(&self.ctx.source(), rel, contents);
        self
    }

    /// Add a directory to the source directory.
    pub fn with_source_dir(self, rel: &str) -> Self {
        std::fs::create_dir_all(self.ctx.source().join(rel)).expect("create source dir");
        self
    }

    /// Add a file to the destination directory.
    pub fn with_home_file(self, rel: &str, contents: &str) -> Self {
        write(&self.ctx.home(), rel, contents);
        self
    }

    /// Finish building and return the configured context.
    pub fn build(self) -> IntegrationTestContext {
        self.ctx
    }
}

/// A typical source tree: a private config directory, a dotfile, an
/// executable, a symlink, and a create-only file.
pub fn sample_source() -> TestContextBuilder {
    TestContextBuilder::new()
        .with_source_file("dot_bashrc", "export EDITOR=vi\n")
        .with_source_file("private_dot_ssh/config", "Host *\n  ForwardAgent no\n")
        .with_source_file("dot_local/bin/executable_hello", "#!/bin/sh\necho hello\n")
        .with_source_file("symlink_dot_vimrc", ".config/vim/vimrc\n")
        .with_source_file("create_dot_notes", "initial\n")
}
