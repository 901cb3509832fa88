//! Operator configuration (`~/.config/devbox/config.toml`).
//!
//! Every section is optional. Provider tokens can also come from
//! `DEVBOX_<PROVIDER>_TOKEN` environment variables, which win over the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths;
use sshkit::RetryConfig;
use vpskit::{PollConfig, ProviderSettings};

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Default desired-state file name inside the config directory
pub const DESIRED_FILE: &str = "devbox.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevboxConfig {
    /// Desired-state file; defaults to `<config dir>/devbox.toml`
    pub desired_state: Option<String>,
    pub operator: OperatorConfig,
    pub credential: CredentialConfig,
    pub ssh: SshConfig,
    pub provisioning: ProvisioningConfig,
    pub proxy: ProxyConfig,
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Who is provisioning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Stable identifier; becomes the remote login name
    pub id: String,
    /// Contact address for the reverse proxy's ACME account
    pub email: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            id: "devbox".to_string(),
            email: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Private key path; defaults to `<config dir>/id_rsa`
    pub private_key: Option<String>,
    /// Public key path; defaults to the private key path plus `.pub`
    pub public_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub port: u16,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            port: sshkit::DEFAULT_PORT,
            max_attempts: 10,
            retry_delay_secs: 3,
        }
    }
}

impl SshConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::fixed(
            self.max_attempts.max(1),
            Duration::from_secs(self.retry_delay_secs),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub poll_interval_secs: u64,
    pub poll_timeout_secs: u64,
    /// Resources provisioned in parallel (1 = sequential)
    pub jobs: usize,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            poll_timeout_secs: 600,
            jobs: 1,
        }
    }
}

impl ProvisioningConfig {
    pub fn poll(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }
}

/// Reverse proxy installed on hosts that declare virtual hosts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Endpoint answering Caddy's forward_auth subrequests
    pub forward_auth: String,
    /// Login path on the auth endpoint
    pub login_uri: String,
    pub image: String,
    /// Docker network shared with the proxied containers
    pub network: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            forward_auth: "https://www.devboxui.com".to_string(),
            login_uri: "/user/login?destination=vhost-auth".to_string(),
            image: "caddy:2".to_string(),
            network: "ddev_default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub token: Option<String>,
    /// Override of the vendor API base URL
    pub api_base: Option<String>,
}

impl DevboxConfig {
    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = paths::config_dir()?.join(CONFIG_FILE);
        Self::load_from(&path)
    }

    /// Load from `path`, falling back to defaults when absent
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Desired-state file path
    pub fn desired_state_path(&self) -> Result<PathBuf> {
        match &self.desired_state {
            Some(path) => Ok(paths::expand(path)),
            None => Ok(paths::config_dir()?.join(DESIRED_FILE)),
        }
    }

    /// Private and public key paths
    pub fn credential_paths(&self) -> Result<(PathBuf, PathBuf)> {
        let private = match &self.credential.private_key {
            Some(path) => paths::expand(path),
            None => paths::config_dir()?.join("id_rsa"),
        };
        let public = match &self.credential.public_key {
            Some(path) => paths::expand(path),
            None => PathBuf::from(format!("{}.pub", private.display())),
        };
        Ok((private, public))
    }

    /// Adapter settings for `provider`, with the env token override applied
    pub fn provider_settings(&self, provider: &str) -> ProviderSettings {
        let configured = self.providers.get(provider).cloned().unwrap_or_default();
        let token = std::env::var(token_env_var(provider))
            .ok()
            .filter(|t| !t.is_empty())
            .or(configured.token);

        ProviderSettings {
            token,
            api_base: configured.api_base,
            poll: self.provisioning.poll(),
        }
    }
}

/// `DEVBOX_<PROVIDER>_TOKEN`
pub fn token_env_var(provider: &str) -> String {
    format!(
        "DEVBOX_{}_TOKEN",
        provider.to_uppercase().replace(['-', '.'], "_")
    )
}
