//! Connection backends.
//!
//! The [`Connector`] trait opens authenticated sessions, allowing for
//! different implementations (libssh2, mock for testing).
//!
//! # Testing
//!
//! Use [`MockConnector`] for testing without network access:
//!
//! ```
//! use sshkit::backend::{Connector, MockConnector};
//! use sshkit::HostTarget;
//!
//! let mock = MockConnector::new().fail_logins(2);
//! let target = HostTarget::new("10.0.0.1", "root");
//!
//! assert!(mock.connect(&target, "key").is_err());
//! assert!(mock.connect(&target, "key").is_err());
//! assert!(mock.connect(&target, "key").is_ok());
//! ```

pub mod mock;
pub mod libssh2;

pub use self::mock::MockConnector;
pub use self::libssh2::Ssh2Connector;

use crate::error::Result;
use crate::types::HostTarget;

/// Raw result of one command, before status interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status
    pub exit_status: i32,
}

/// An authenticated session able to run commands.
pub trait Session: Send {
    /// Run one command on a fresh exec channel (no PTY) and wait for it.
    fn exec(&mut self, command: &str) -> Result<ExecResult>;
}

/// Opens authenticated sessions.
pub trait Connector: Send + Sync {
    /// Connect and log in with an in-memory private key (PEM).
    ///
    /// A single attempt; retrying is the caller's job.
    fn connect(&self, target: &HostTarget, private_key: &str) -> Result<Box<dyn Session>>;
}
