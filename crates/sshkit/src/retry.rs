//! Login retry loop.

use crate::error::{Error, Result};
use crate::types::RetryConfig;
use std::thread;

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called after every failed attempt that will be retried.
    ///
    /// # Arguments
    /// * `host` - Host being contacted
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay_secs` - Seconds until next attempt
    fn on_retry(&self, host: &str, attempt: u32, max_attempts: u32, error: &Error, delay_secs: u64);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _host: &str, _attempt: u32, _max: u32, _error: &Error, _delay: u64) {}
}

/// Callback that writes retry information to the `log` facade.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, host: &str, attempt: u32, max_attempts: u32, error: &Error, delay_secs: u64) {
        log::warn!(
            "{}: attempt {}/{} failed: {}. Retrying in {}s...",
            host,
            attempt,
            max_attempts,
            error,
            delay_secs
        );
    }
}

/// Run `operation` until it succeeds, retrying retryable errors.
///
/// The closure receives the 1-indexed attempt number. On success the value
/// is returned with the number of attempts used. A non-retryable error is
/// returned as-is; running out of attempts yields
/// [`Error::ConnectionExhausted`].
pub fn with_retry<T, F>(
    host: &str,
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<(T, u32)>
where
    F: FnMut(u32) -> Result<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..max_attempts {
        let number = attempt + 1;
        match operation(number) {
            Ok(value) => {
                log::debug!("{}: login attempt {}/{} succeeded", host, number, max_attempts);
                return Ok((value, number));
            }
            Err(e) => {
                log::debug!("{}: login attempt {}/{} failed: {}", host, number, max_attempts, e);

                if !e.is_retryable() {
                    return Err(e);
                }

                last_error = e.to_string();

                if number >= max_attempts {
                    break;
                }

                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(host, number, max_attempts, &e, delay.as_secs());
                }
                thread::sleep(delay);
            }
        }
    }

    Err(Error::ConnectionExhausted {
        host: host.to_string(),
        attempts: max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::time::Duration;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::fixed(max_attempts, Duration::ZERO)
    }

    fn refused() -> Error {
        Error::Connect {
            host: "h".into(),
            message: "connection refused".into(),
        }
    }

    #[test]
    fn test_success_first_try() {
        let (value, attempts) = with_retry("h", &fast(3), None, |_| Ok::<_, Error>(42)).unwrap();
        assert_eq!(value, 42);
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_eventual_success_counts_attempts() {
        let calls = Cell::new(0);
        let (_, attempts) = with_retry("h", &fast(5), None, |_| {
            calls.set(calls.get() + 1);
            if calls.get() <= 3 { Err(refused()) } else { Ok(()) }
        })
        .unwrap();
        assert_eq!(attempts, 4);
    }

    #[test]
    fn test_exhaustion() {
        let calls = Cell::new(0);
        let err = with_retry("h", &fast(3), None, |_| -> Result<()> {
            calls.set(calls.get() + 1);
            Err(refused())
        })
        .unwrap_err();

        assert_eq!(calls.get(), 3);
        match err {
            Error::ConnectionExhausted {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_retryable_error_stops_immediately() {
        let calls = Cell::new(0);
        let err = with_retry("h", &fast(5), None, |_| -> Result<()> {
            calls.set(calls.get() + 1);
            Err(Error::InvalidKey("not a PEM".into()))
        })
        .unwrap_err();

        assert_eq!(calls.get(), 1);
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
