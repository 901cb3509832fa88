//! Operator SSH credential.
//!
//! The private half (PEM) never leaves this machine. The public half is
//! uploaded to providers and installed in `authorized_keys` on every host.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::app::normalize_name;
use crate::runner;

/// Name the operator key is uploaded under at every provider
pub fn key_name(operator_id: &str) -> String {
    format!("devbox-{}", normalize_name(operator_id))
}

/// The key pair is missing or unusable
#[derive(Debug, Error)]
#[error("credential {path} is misconfigured: {reason}")]
pub struct MisconfiguredCredential {
    pub path: PathBuf,
    pub reason: String,
}

impl MisconfiguredCredential {
    fn new(path: &Path, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn advice(&self) -> &'static str {
        "Run `devbox keys generate` or fix [credential] in config.toml"
    }
}

#[derive(Clone)]
pub struct Credential {
    pub private_key: String,
    pub public_key: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl Credential {
    /// Read and sanity-check both halves
    pub fn load(private_path: &Path, public_path: &Path) -> Result<Self, MisconfiguredCredential> {
        let private_key = read_key(private_path)?;
        if !private_key.contains("PRIVATE KEY") {
            return Err(MisconfiguredCredential::new(
                private_path,
                "not a PEM private key",
            ));
        }

        let public_key = read_key(public_path)?.trim().to_string();
        if !public_key.starts_with("ssh-") && !public_key.starts_with("ecdsa-") {
            return Err(MisconfiguredCredential::new(
                public_path,
                "not an OpenSSH public key",
            ));
        }

        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Create a 4096-bit RSA pair with `ssh-keygen`.
    ///
    /// Refuses to overwrite an existing key unless `force` is set.
    pub fn generate(private_path: &Path, comment: &str, force: bool) -> Result<PathBuf> {
        let public_path = PathBuf::from(format!("{}.pub", private_path.display()));

        if private_path.exists() {
            if !force {
                anyhow::bail!(
                    "{} already exists (use --force to replace it)",
                    private_path.display()
                );
            }
            fs::remove_file(private_path)
                .with_context(|| format!("Failed to remove {}", private_path.display()))?;
            if public_path.exists() {
                fs::remove_file(&public_path)
                    .with_context(|| format!("Failed to remove {}", public_path.display()))?;
            }
        }

        if !runner::command_exists("ssh-keygen") {
            anyhow::bail!("ssh-keygen not found on PATH");
        }

        if let Some(dir) = private_path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let path = private_path.to_string_lossy();
        runner::run_capture(
            "ssh-keygen",
            &[
                "-t", "rsa", "-b", "4096", "-m", "PEM", "-N", "", "-C", comment, "-f", &path,
            ],
        )?;

        log::info!("Generated key pair at {}", private_path.display());
        Ok(public_path)
    }
}

fn read_key(path: &Path) -> Result<String, MisconfiguredCredential> {
    if !path.exists() {
        return Err(MisconfiguredCredential::new(path, "file not found"));
    }
    fs::read_to_string(path).map_err(|e| MisconfiguredCredential::new(path, e.to_string()))
}
