//! Password prompt protocol.
use std::io::{IsTerminal as _, Read};

use crate::error::{Result, StateError};

/// Longest accepted password, in bytes.
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Source of passwords for credential tools.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordPrompt {
    /// Ask for a password, showing `prompt` when interactive.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Prompt`] if no password could be read.
    fn read_password(&self, prompt: &str) -> Result<String>;
}

/// Reads from the terminal with echo suppressed, or from piped stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl PasswordPrompt for TerminalPrompt {
    fn read_password(&self, prompt: &str) -> Result<String> {
        let stdin = std::io::stdin();
        if stdin.is_terminal() {
            return dialoguer::Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
                .map_err(|e| StateError::Prompt(e.to_string()));
        }
        read_password_from(stdin.lock())
    }
}

/// Read one password line from `reader`, byte by byte.
///
/// `\r` is discarded and `\n` ends the password. End of input also ends it,
/// but only once at least one byte has been read.
///
/// # Errors
///
/// Returns [`StateError::Prompt`] on empty input or a password longer than
/// [`MAX_PASSWORD_LEN`], and [`StateError::Io`] if reading fails.
pub fn read_password_from(mut reader: impl Read) -> Result<String> {
    let mut password = Vec::new();
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) if password.is_empty() => {
                return Err(StateError::Prompt("unexpected end of input".to_string()));
            }
            Ok(0) => break,
            Ok(_) => {
                let [byte] = buf;
                match byte {
                    b'\r' => {}
                    b'\n' => break,
                    _ => {
                        password.push(byte);
                        if password.len() > MAX_PASSWORD_LEN {
                            return Err(StateError::Prompt("password too long".to_string()));
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(StateError::io("stdin", e)),
        }
    }
    String::from_utf8(password)
        .map_err(|e| StateError::Prompt(format!("password is not valid UTF-8: {e}")))
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reads_up_to_newline() {
        assert_eq!(read_password_from(&b"hunter2\nrest"[..]).unwrap(), "hunter2");
    }

    #[test]
    fn discards_carriage_returns() {
        assert_eq!(read_password_from(&b"pa\rss\r\n"[..]).unwrap(), "pass");
    }

    #[test]
    fn eof_terminates_non_empty_password() {
        assert_eq!(read_password_from(&b"secret"[..]).unwrap(), "secret");
    }

    #[test]
    fn eof_on_empty_input_fails() {
        let err = read_password_from(&b""[..]).unwrap_err();
        assert!(matches!(err, StateError::Prompt(_)));
    }

    #[test]
    fn empty_line_is_empty_password() {
        assert_eq!(read_password_from(&b"\n"[..]).unwrap(), "");
    }

    #[test]
    fn length_is_capped() {
        let exact = vec![b'x'; MAX_PASSWORD_LEN];
        assert_eq!(read_password_from(exact.as_slice()).unwrap().len(), MAX_PASSWORD_LEN);

        let long = vec![b'x'; MAX_PASSWORD_LEN + 1];
        let err = read_password_from(long.as_slice()).unwrap_err();
        assert_eq!(err.to_string(), "password too long");
    }
}
