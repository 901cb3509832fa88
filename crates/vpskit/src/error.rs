//! Error types for provider operations.
//!
//! Errors are categorized so the caller can decide whether a failure is
//! worth surfacing, retrying later, or ignoring.

use serde_json::Value;
use std::fmt;

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport-level failure (transient, retryable).
    Network,
    /// Vendor rejected the token.
    Auth,
    /// Vendor says the object does not exist.
    NotFound,
    /// Vendor returned some other non-success status.
    Api,
    /// Response did not have the expected shape.
    Format,
    /// Server never reached the running state.
    Timeout,
    /// Operation or provider not available.
    Unsupported,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Whether this error can be safely ignored (object already gone).
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Provider rejected the API token",
            Self::NotFound => "Object not found at the provider",
            Self::Api => "Provider API error",
            Self::Format => "Unexpected provider response",
            Self::Timeout => "Server did not start in time",
            Self::Unsupported => "Not supported by this provider",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::Auth => "Check the provider token in config.toml or DEVBOX_<PROVIDER>_TOKEN",
            Self::NotFound => "The object may have been removed in the provider console",
            Self::Api => "Check the error message; quotas and plan availability vary by region",
            Self::Format => "The provider API may have changed; check for a newer release",
            Self::Timeout => "Check the server in the provider console, then re-run apply",
            Self::Unsupported => "Use one of: hetzner, digitalocean, vultr, linode, manual",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Vendor returned a non-success HTTP status.
    #[error("{provider} {endpoint} returned {status}: {message}")]
    Provider {
        /// Provider key.
        provider: String,
        /// Endpoint path that failed.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body or vendor error message.
        message: String,
    },

    /// HTTP request failed before a response arrived.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Invalid response from API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// A required field was absent.
    #[error("missing field `{field}` in {context}")]
    MissingField {
        /// Field name.
        field: String,
        /// Where the field was expected.
        context: String,
    },

    /// Server did not reach the running state before the deadline.
    #[error("{provider} server {id} still `{status}` after {waited_secs}s")]
    ProvisioningTimeout {
        /// Provider key.
        provider: String,
        /// Provider-assigned server id.
        id: String,
        /// Last status seen.
        status: String,
        /// Seconds waited.
        waited_secs: u64,
        /// Last descriptor seen; the server exists even though it is not ready.
        descriptor: Box<Value>,
    },

    /// Operation not available for this provider.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        /// Provider key.
        provider: String,
        /// Operation name.
        operation: String,
    },

    /// No adapter registered under the key.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Adapter needs an API token and none was configured.
    #[error("no API token configured for {0}")]
    MissingToken(String),

    /// Key handle could not be persisted.
    #[error("key store error: {0}")]
    Store(String),
}

impl Error {
    /// Create a missing-field error.
    pub fn missing(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Descriptor of a server that was created but never became ready.
    ///
    /// Callers record it so a later create resumes waiting instead of
    /// ordering a second server.
    pub fn unfinished_server(&self) -> Option<&Value> {
        match self {
            Self::ProvisioningTimeout { descriptor, .. } => Some(&**descriptor),
            _ => None,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Provider { status, .. } => match status {
                401 | 403 => ErrorCategory::Auth,
                404 => ErrorCategory::NotFound,
                429 | 500..=599 => ErrorCategory::Network,
                _ => ErrorCategory::Api,
            },
            Error::Http(_) => ErrorCategory::Network,
            Error::InvalidResponse(_) | Error::MissingField { .. } => ErrorCategory::Format,
            Error::ProvisioningTimeout { .. } => ErrorCategory::Timeout,
            Error::Unsupported { .. } | Error::UnknownProvider(_) => ErrorCategory::Unsupported,
            Error::MissingToken(_) => ErrorCategory::Auth,
            Error::Store(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error can be safely ignored.
    #[must_use]
    pub fn is_ignorable(&self) -> bool {
        self.category().is_ignorable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> Error {
        Error::Provider {
            provider: "hetzner".into(),
            endpoint: "servers".into(),
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn test_status_categories() {
        assert_eq!(status(401).category(), ErrorCategory::Auth);
        assert_eq!(status(404).category(), ErrorCategory::NotFound);
        assert_eq!(status(422).category(), ErrorCategory::Api);
        assert_eq!(status(503).category(), ErrorCategory::Network);
    }

    #[test]
    fn test_not_found_is_ignorable() {
        assert!(status(404).is_ignorable());
        assert!(!status(500).is_ignorable());
        assert!(status(500).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::ProvisioningTimeout {
            provider: "vultr".into(),
            id: "abc".into(),
            status: "pending".into(),
            waited_secs: 600,
            descriptor: Box::new(serde_json::json!({ "id": "abc" })),
        };
        assert_eq!(err.to_string(), "vultr server abc still `pending` after 600s");
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(err.unfinished_server().unwrap()["id"], "abc");
        assert!(status(500).unfinished_server().is_none());
    }
}
