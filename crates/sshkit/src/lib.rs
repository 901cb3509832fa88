//! # sshkit
//!
//! Run commands on remote hosts over SSH, tolerating hosts that are still
//! booting.
//!
//! This crate provides functionality for:
//! - Logging in with an in-memory private key
//! - Retrying logins on a fixed schedule until the host answers
//! - Running one command, or a sequence over a single session
//! - Swapping the transport for a mock in tests
//!
//! ## Example
//!
//! ```no_run
//! use sshkit::RemoteExecutor;
//!
//! let executor = RemoteExecutor::new();
//! let key = std::fs::read_to_string("id_rsa").unwrap();
//!
//! let output = executor
//!     .execute("203.0.113.10", "root", &key, "uname -a")
//!     .expect("command failed");
//! println!("{} (after {} attempts)", output.stdout, output.attempts);
//! ```
//!
//! ## Retry Logic
//!
//! Connection and authentication errors are retried with a fixed delay.
//! When every attempt fails the command is never run and
//! [`Error::ConnectionExhausted`] is returned.
//!
//! ```
//! use sshkit::{RemoteExecutor, RetryConfig};
//! use sshkit::backend::MockConnector;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mock = MockConnector::new().fail_logins(2);
//! let executor = RemoteExecutor::with_connector(Arc::new(mock))
//!     .with_retry(RetryConfig::fixed(5, Duration::ZERO));
//!
//! let output = executor.execute("h", "root", "key", "true").unwrap();
//! assert_eq!(output.attempts, 3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod retry;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use types::{CommandOutput, DEFAULT_PORT, HostTarget, RetryConfig};

use backend::{Connector, Session, Ssh2Connector};
use retry::{LogCallback, RetryCallback};
use std::sync::Arc;

/// Executes commands on remote hosts with login retries.
///
/// The executor is cheap to clone and safe to share between threads; each
/// call opens its own session.
#[derive(Clone)]
pub struct RemoteExecutor {
    connector: Arc<dyn Connector>,
    retry: RetryConfig,
    port: u16,
    callback: Arc<dyn RetryCallback>,
}

impl Default for RemoteExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteExecutor {
    /// Create an executor using libssh2 and the default retry policy.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(Ssh2Connector::new()))
    }

    /// Create an executor with a custom connector (useful for testing).
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            retry: RetryConfig::default(),
            port: DEFAULT_PORT,
            callback: Arc::new(LogCallback),
        }
    }

    /// Override the login retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the SSH port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the retry notification callback.
    pub fn with_callback(mut self, callback: Arc<dyn RetryCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Retry policy in use.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Log in and run a single command.
    ///
    /// A non-zero exit status is returned as [`Error::CommandFailed`] with
    /// the output attached.
    pub fn execute(
        &self,
        host: &str,
        username: &str,
        private_key: &str,
        command: &str,
    ) -> Result<CommandOutput> {
        let target = self.target(host, username);
        let (mut session, attempts) = self.login(&target, private_key)?;
        run_one(session.as_mut(), &target, command, attempts)
    }

    /// Log in once and run `commands` in order, stopping at the first failure.
    pub fn run_many<S: AsRef<str>>(
        &self,
        host: &str,
        username: &str,
        private_key: &str,
        commands: &[S],
    ) -> Result<Vec<CommandOutput>> {
        let target = self.target(host, username);
        let (mut session, attempts) = self.login(&target, private_key)?;

        commands
            .iter()
            .map(|command| run_one(session.as_mut(), &target, command.as_ref(), attempts))
            .collect()
    }

    fn target(&self, host: &str, username: &str) -> HostTarget {
        HostTarget::new(host, username).with_port(self.port)
    }

    fn login(&self, target: &HostTarget, private_key: &str) -> Result<(Box<dyn Session>, u32)> {
        retry::with_retry(
            &target.host,
            &self.retry,
            Some(self.callback.as_ref()),
            |attempt| {
                log::info!(
                    "Connecting to {} (attempt {}/{})",
                    target,
                    attempt,
                    self.retry.max_attempts
                );
                self.connector.connect(target, private_key)
            },
        )
        .inspect_err(|e| log::error!("{}", e))
    }
}

fn run_one(
    session: &mut dyn Session,
    target: &HostTarget,
    command: &str,
    attempts: u32,
) -> Result<CommandOutput> {
    log::info!("{}: {}", target, command);
    let result = session.exec(command)?;

    let output = CommandOutput {
        stdout: result.stdout,
        stderr: result.stderr,
        exit_status: result.exit_status,
        attempts,
    };

    if output.success() {
        log::debug!("{}: exit 0: {}", target, output.combined());
        Ok(output)
    } else {
        log::warn!(
            "{}: `{}` exited with {}: {}",
            target,
            command,
            output.exit_status,
            output.combined()
        );
        Err(Error::CommandFailed {
            host: target.host.clone(),
            command: command.to_string(),
            status: output.exit_status,
            output: output.combined(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backend::MockConnector;
    use std::time::Duration;

    fn executor(mock: &MockConnector, max_attempts: u32) -> RemoteExecutor {
        RemoteExecutor::with_connector(Arc::new(mock.clone()))
            .with_retry(RetryConfig::fixed(max_attempts, Duration::ZERO))
    }

    #[test]
    fn test_succeeds_after_fewer_failures_than_max() {
        for n in 0..5 {
            let mock = MockConnector::new().fail_logins(n);
            let output = executor(&mock, 5)
                .execute("10.0.0.1", "root", "key", "apt-get update")
                .unwrap();
            assert_eq!(output.attempts, n + 1);
            assert_eq!(mock.executed(), vec!["apt-get update"]);
        }
    }

    #[test]
    fn test_exhausted_never_runs_command() {
        for n in [5, 6, 20] {
            let mock = MockConnector::new().fail_logins(n);
            let err = executor(&mock, 5)
                .execute("10.0.0.1", "root", "key", "apt-get update")
                .unwrap_err();
            assert!(matches!(err, Error::ConnectionExhausted { attempts: 5, .. }));
            assert!(mock.executed().is_empty());
            assert_eq!(mock.login_attempts(), 5);
        }
    }

    #[test]
    fn test_nonzero_exit_is_command_failed_with_output() {
        let mock = MockConnector::new().respond("systemctl", 3, "unit not found");
        let err = executor(&mock, 1)
            .execute("h", "root", "key", "systemctl restart ssh")
            .unwrap_err();
        match err {
            Error::CommandFailed {
                status,
                output,
                command,
                ..
            } => {
                assert_eq!(status, 3);
                assert_eq!(output, "unit not found");
                assert_eq!(command, "systemctl restart ssh");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_many_stops_at_first_failure() {
        let mock = MockConnector::new().respond("false", 1, "");
        let result = executor(&mock, 1).run_many("h", "root", "key", &["true", "false", "echo"]);
        assert!(result.is_err());
        assert_eq!(mock.executed(), vec!["true", "false"]);
        assert_eq!(mock.login_attempts(), 1);
    }

    #[test]
    fn test_runs_as_given_user_and_port() {
        let mock = MockConnector::new();
        executor(&mock, 1)
            .with_port(2222)
            .execute("h", "dev", "key", "docker ps")
            .unwrap();
        assert_eq!(
            mock.executed_as(),
            vec![("dev@h:2222".to_string(), "docker ps".to_string())]
        );
    }
}
