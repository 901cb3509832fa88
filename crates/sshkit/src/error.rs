//! Error types for remote command execution.
//!
//! Errors are categorized so callers can tell a host that never came up
//! apart from a command that ran and failed.

use thiserror::Error;

/// Categories of SSH errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// TCP connect or handshake failed (transient, retryable)
    Network,
    /// Server rejected the key (retryable: keys may still be propagating)
    Authentication,
    /// Every login attempt failed
    Unreachable,
    /// Command ran and exited non-zero
    Command,
    /// Protocol failure after login
    Session,
    /// Private key unusable
    Credential,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Authentication)
    }

    /// Whether this error can be safely ignored.
    pub fn is_ignorable(&self) -> bool {
        false
    }

    /// Whether the host should be considered unreachable for further steps.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Credential)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Host not reachable",
            Self::Authentication => "SSH login rejected",
            Self::Unreachable => "Host unreachable after retries",
            Self::Command => "Remote command failed",
            Self::Session => "SSH session error",
            Self::Credential => "Invalid private key",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check that the host is running and port 22 is open",
            Self::Authentication => "Check that the public key is installed for this user",
            Self::Unreachable => "Check the server in the provider console, then re-run apply",
            Self::Command => "Inspect the command output for details",
            Self::Session => "Retry the operation; the connection dropped mid-command",
            Self::Credential => "Regenerate the key pair with `devbox keys generate`",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while talking to a remote host.
#[derive(Debug, Error)]
pub enum Error {
    /// TCP connection or SSH handshake failed
    #[error("cannot connect to {host}: {message}")]
    Connect {
        /// Target host
        host: String,
        /// Underlying transport message
        message: String,
    },

    /// Public key authentication was refused
    #[error("login as {username}@{host} rejected: {message}")]
    Auth {
        /// Target host
        host: String,
        /// Login name
        username: String,
        /// Server or library message
        message: String,
    },

    /// All login attempts failed; the command was never run
    #[error("{host} unreachable after {attempts} attempts: {last_error}")]
    ConnectionExhausted {
        /// Target host
        host: String,
        /// Number of attempts made
        attempts: u32,
        /// Message of the final failure
        last_error: String,
    },

    /// Command exited with a non-zero status
    #[error("`{command}` on {host} exited with status {status}")]
    CommandFailed {
        /// Target host
        host: String,
        /// Command line that failed
        command: String,
        /// Exit status reported by the server
        status: i32,
        /// Combined stdout and stderr, kept for diagnostics
        output: String,
    },

    /// Channel or protocol failure after login
    #[error("SSH session error on {host}: {message}")]
    Session {
        /// Target host
        host: String,
        /// Underlying message
        message: String,
    },

    /// The private key could not be used
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Connect { .. } => ErrorCategory::Network,
            Error::Auth { .. } => ErrorCategory::Authentication,
            Error::ConnectionExhausted { .. } => ErrorCategory::Unreachable,
            Error::CommandFailed { .. } => ErrorCategory::Command,
            Error::Session { .. } => ErrorCategory::Session,
            Error::InvalidKey(_) => ErrorCategory::Credential,
            Error::Io(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error can be safely ignored.
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }

    /// Whether later steps against the same host are pointless.
    pub fn is_blocking(&self) -> bool {
        self.category().is_blocking()
    }

    /// Output captured before the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Result type for SSH operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(ErrorCategory::Authentication.is_retryable());
        assert!(!ErrorCategory::Command.is_retryable());
        assert!(!ErrorCategory::Credential.is_retryable());
    }

    #[test]
    fn test_exhausted_is_blocking() {
        let err = Error::ConnectionExhausted {
            host: "10.0.0.1".into(),
            attempts: 10,
            last_error: "connection refused".into(),
        };
        assert!(err.is_blocking());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "10.0.0.1 unreachable after 10 attempts: connection refused"
        );
    }

    #[test]
    fn test_command_failed_keeps_output() {
        let err = Error::CommandFailed {
            host: "h".into(),
            command: "false".into(),
            status: 1,
            output: "boom".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Command);
        assert_eq!(err.output(), Some("boom"));
        assert!(!err.is_blocking());
    }
}
