//! Containerized apps: `docker run` command lines and teardown.

use anyhow::{Context, Result};
use reconcile::ResourceDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::scripts::shell_quote;

/// Declarative container settings of one app
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub image: String,
    /// Environment variables; names are upper-cased
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub ports: Vec<PortMap>,
    /// Extra `--name=value` flags
    #[serde(default)]
    pub custom: BTreeMap<String, String>,
    /// Capability flags (`cap_add = "NET_ADMIN"` becomes `--cap-add=NET_ADMIN`)
    #[serde(default)]
    pub caps: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub host: String,
    pub container: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMap {
    pub external: u16,
    pub internal: u16,
}

impl AppConfig {
    pub fn from_descriptor(resource: &ResourceDescriptor) -> Result<Self> {
        serde_json::from_value(Value::Object(resource.desired_config.clone()))
            .with_context(|| format!("Invalid app config for {}", resource.id))
    }
}

/// Container-safe name derived from a resource id.
///
/// Lower-case ASCII alphanumerics only, starting with a letter, at most 32
/// characters so it is also a valid Linux login name.
pub fn normalize_name(id: &str) -> String {
    let mut name: String = id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        name.insert(0, 'u');
    }
    name.truncate(32);
    name
}

/// `docker run -d --name=<name> <flags...> <image>`
pub fn run_command(app_id: &str, config: &AppConfig) -> String {
    let mut parts = vec![
        "docker run -d".to_string(),
        format!("--name={}", normalize_name(app_id)),
    ];

    for (key, value) in &config.env {
        parts.push(format!(
            "-e {}",
            shell_quote(&format!("{}={}", key.to_uppercase(), value))
        ));
    }
    for volume in &config.volumes {
        parts.push(format!(
            "-v {}",
            shell_quote(&format!("{}:{}", volume.host, volume.container))
        ));
    }
    for port in &config.ports {
        parts.push(format!("-p {}:{}", port.external, port.internal));
    }
    for (flag, value) in &config.custom {
        parts.push(format!("--{}={}", flag, shell_quote(value)));
    }
    for (flag, value) in &config.caps {
        parts.push(format!("--{}={}", flag.replace('_', "-"), shell_quote(value)));
    }

    parts.push(shell_quote(&config.image));
    parts.join(" \\\n  ")
}

/// Stop and remove the app's container.
pub fn teardown_command(app_id: &str) -> String {
    let name = normalize_name(app_id);
    format!("docker stop {name}; docker rm {name}")
}

/// Remove the app's generated configuration directory.
pub fn cleanup_command(app_id: &str) -> String {
    format!("rm -rf ~/config-{}", normalize_name(app_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("uptime"), "uptime");
        assert_eq!(normalize_name("My-App_2"), "myapp2");
        assert_eq!(
            normalize_name("4f6c1d2e-9a0b-4c3d-8e7f-001122334455"),
            "u4f6c1d2e9a0b4c3d8e7f00112233445"
        );
        assert_eq!(normalize_name(""), "u");
    }

    #[test]
    fn test_run_command_flag_order() {
        let mut config = AppConfig {
            image: "louislam/uptime-kuma:1".into(),
            ..Default::default()
        };
        config.env.insert("tz".into(), "UTC".into());
        config.volumes.push(Volume {
            host: "/srv/uptime".into(),
            container: "/app/data".into(),
        });
        config.ports.push(PortMap {
            external: 3001,
            internal: 3001,
        });
        config.custom.insert("restart".into(), "always".into());
        config.caps.insert("cap_add".into(), "NET_ADMIN".into());

        let command = run_command("uptime", &config);
        let lines: Vec<&str> = command.lines().map(str::trim).collect();
        assert_eq!(
            lines,
            vec![
                "docker run -d \\",
                "--name=uptime \\",
                "-e 'TZ=UTC' \\",
                "-v '/srv/uptime:/app/data' \\",
                "-p 3001:3001 \\",
                "--restart='always' \\",
                "--cap-add='NET_ADMIN' \\",
                "'louislam/uptime-kuma:1'",
            ]
        );
    }

    #[test]
    fn test_minimal_run_command() {
        let config = AppConfig {
            image: "nginx".into(),
            ..Default::default()
        };
        assert_eq!(
            run_command("web", &config),
            "docker run -d \\\n  --name=web \\\n  'nginx'"
        );
    }

    #[test]
    fn test_teardown_and_cleanup() {
        assert_eq!(teardown_command("Web-1"), "docker stop web1; docker rm web1");
        assert_eq!(cleanup_command("Web-1"), "rm -rf ~/config-web1");
    }
}
