//! Credential-tool integrations.
//!
//! Lookups go through a [`CmdRunner`](crate::exec::CmdRunner) so that the
//! same code runs against the real system, the dry-run wrapper, or a mock.
pub mod keepassxc;
pub mod password;

pub use keepassxc::{KeePassXc, KeePassXcConfig, parse_show_output};
pub use password::{PasswordPrompt, TerminalPrompt, read_password_from};
