//! Child-process helpers.
use std::io::Write as _;
use std::process::{Command, Stdio};

use crate::error::{Result, StateError};

/// A command to run: program, arguments, and optional bytes piped to stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Arguments, not including the program.
    pub args: Vec<String>,
    /// Bytes written to the child's stdin, which is then closed.
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    /// Create an invocation with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Pipe `bytes` to the child's stdin.
    #[must_use]
    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    /// The full command line, shell-quoted, for diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, shell_quote_args(&self.args))
        }
    }
}

/// Something that can run side-effect-free commands and capture stdout.
///
/// Every [`System`](crate::system::System) implements this; template-style
/// helpers such as the KeePassXC integration depend only on this trait.
#[cfg_attr(test, mockall::automock)]
pub trait CmdRunner {
    /// Run `invocation` and return its stdout. Stderr is forwarded to the
    /// terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started or exits non-zero.
    fn idempotent_cmd_output(&self, invocation: &Invocation) -> Result<Vec<u8>>;
}

/// Runs invocations directly on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl CmdRunner for HostRunner {
    fn idempotent_cmd_output(&self, invocation: &Invocation) -> Result<Vec<u8>> {
        run_invocation(invocation)
    }
}

/// Run an invocation, forwarding stderr and returning stdout.
///
/// # Errors
///
/// Returns [`StateError::Io`] if the program cannot be started and
/// [`StateError::ChildProcess`] if it exits unsuccessfully.
pub fn run_invocation(invocation: &Invocation) -> Result<Vec<u8>> {
    let program = which::which(&invocation.program).map_err(|e| {
        StateError::io(
            &invocation.program,
            std::io::Error::new(std::io::ErrorKind::NotFound, e),
        )
    })?;
    let mut cmd = Command::new(program);
    cmd.args(&invocation.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    cmd.stdin(if invocation.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd
        .spawn()
        .map_err(|e| StateError::io(&invocation.program, e))?;

    // stdin is fed from its own thread so a child that writes before it
    // finishes reading cannot fill the stdout pipe and stall both sides.
    let stdin = invocation.stdin.as_deref().zip(child.stdin.take());
    let (output, written) = std::thread::scope(|scope| {
        let writer = stdin.map(|(bytes, mut pipe)| scope.spawn(move || pipe.write_all(bytes)));
        let output = child.wait_with_output();
        let written = writer.map_or(Ok(()), |handle| {
            handle
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")))
        });
        (output, written)
    });
    let output = output.map_err(|e| StateError::io(&invocation.program, e))?;
    // A child that exits without reading stdin closes the pipe; its exit
    // status is the interesting failure, not the broken pipe.
    if let Err(e) = written
        && e.kind() != std::io::ErrorKind::BrokenPipe
    {
        return Err(StateError::io(&invocation.program, e));
    }
    if !output.status.success() {
        return Err(StateError::ChildProcess {
            command: invocation.program.clone(),
            reason: output.status.to_string(),
        });
    }
    Ok(output.stdout)
}

/// Quote a single argument for display in a POSIX shell.
#[must_use]
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"%+,-./:=@_".contains(&b));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Quote and space-join arguments.
#[must_use]
pub fn shell_quote_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| shell_quote(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
