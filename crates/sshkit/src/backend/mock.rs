//! In-memory connector for tests.

use super::{Connector, ExecResult, Session};
use crate::error::{Error, Result};
use crate::types::HostTarget;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockState {
    failures_left: u32,
    login_attempts: u32,
    down_hosts: HashSet<String>,
    responses: HashMap<String, ExecResult>,
    executed: Vec<(String, String)>,
}

/// Mock connector for testing without network access.
///
/// Logins fail a configurable number of times before succeeding; hosts
/// can be marked permanently down. Every executed command is recorded with
/// the login it ran as.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Create a connector that always logs in and runs every command successfully.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` login attempts.
    #[must_use]
    pub fn fail_logins(self, n: u32) -> Self {
        self.state.lock().unwrap().failures_left = n;
        self
    }

    /// Refuse every login to `host`.
    #[must_use]
    pub fn host_down(self, host: impl Into<String>) -> Self {
        self.state.lock().unwrap().down_hosts.insert(host.into());
        self
    }

    /// Reply to commands starting with `prefix`.
    #[must_use]
    pub fn respond(self, prefix: impl Into<String>, status: i32, stdout: impl Into<String>) -> Self {
        self.state.lock().unwrap().responses.insert(
            prefix.into(),
            ExecResult {
                stdout: stdout.into(),
                stderr: String::new(),
                exit_status: status,
            },
        );
        self
    }

    /// Number of login attempts made so far.
    pub fn login_attempts(&self) -> u32 {
        self.state.lock().unwrap().login_attempts
    }

    /// Commands executed so far.
    pub fn executed(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.executed.iter().map(|(_, cmd)| cmd.clone()).collect()
    }

    /// Commands executed so far, with the `user@host` they ran as.
    pub fn executed_as(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().executed.clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, target: &HostTarget, _private_key: &str) -> Result<Box<dyn Session>> {
        let mut state = self.state.lock().unwrap();
        state.login_attempts += 1;

        if state.down_hosts.contains(&target.host) {
            return Err(Error::Connect {
                host: target.host.clone(),
                message: "connection refused".to_string(),
            });
        }

        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(Error::Connect {
                host: target.host.clone(),
                message: "connection refused".to_string(),
            });
        }

        Ok(Box::new(MockSession {
            login: target.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    login: String,
    state: Arc<Mutex<MockState>>,
}

impl Session for MockSession {
    fn exec(&mut self, command: &str) -> Result<ExecResult> {
        let mut state = self.state.lock().unwrap();
        state
            .executed
            .push((self.login.clone(), command.to_string()));

        let reply = state
            .responses
            .iter()
            .filter(|(prefix, _)| command.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply.clone())
            .unwrap_or_default();
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_prefix_wins() {
        let mock = MockConnector::new()
            .respond("docker", 0, "generic")
            .respond("docker ps", 0, "specific");
        let target = HostTarget::new("h", "root");
        let mut session = mock.connect(&target, "k").ok().unwrap();

        assert_eq!(session.exec("docker ps -a").unwrap().stdout, "specific");
        assert_eq!(session.exec("docker rm x").unwrap().stdout, "generic");
        assert_eq!(session.exec("uptime").unwrap().exit_status, 0);
        assert_eq!(mock.executed().len(), 3);
    }

    #[test]
    fn test_down_host_never_connects() {
        let mock = MockConnector::new().host_down("10.0.0.9");
        assert!(mock.connect(&HostTarget::new("10.0.0.9", "root"), "k").is_err());
        assert!(mock.connect(&HostTarget::new("10.0.0.8", "root"), "k").is_ok());
        assert_eq!(mock.login_attempts(), 2);
    }
}
