//! Desired-state file.
//!
//! ```toml
//! [[vps]]
//! id = "web-1"
//! provider = "hetzner"
//! server_type = "cx22_fsn1"
//! tools = ["package_updates", "docker_engine"]
//!
//! [[vps.vhost]]
//! host = "app.example.com"
//! container = "ddev-app-web"
//! locked = true
//!
//! [[vps]]
//! id = "office"
//! provider = "manual"
//! ip = "203.0.113.10"
//!
//! [[app]]
//! id = "uptime"
//! vps = "web-1"
//! image = "louislam/uptime-kuma:1"
//! ports = [{ external = 3001, internal = 3001 }]
//! ```

use anyhow::{Context, Result, bail};
use regex::Regex;
use reconcile::{ResourceDescriptor, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::app::{AppConfig, normalize_name};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredState {
    #[serde(default)]
    pub vps: Vec<VpsEntry>,
    #[serde(default)]
    pub app: Vec<AppEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VpsEntry {
    pub id: String,
    pub provider: String,
    /// `<plan>_<region>` key from `devbox plans`
    pub server_type: Option<String>,
    /// Address of a manual host
    pub ip: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, rename = "vhost")]
    pub vhosts: Vec<VirtualHost>,
}

/// A site served by the reverse proxy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualHost {
    pub host: String,
    /// Container the site proxies to, on the proxy network
    pub container: String,
    #[serde(default = "default_vhost_port")]
    pub port: u16,
    /// Require forward-auth login
    #[serde(default)]
    pub locked: bool,
}

fn default_vhost_port() -> u16 {
    80
}

#[derive(Debug, Deserialize)]
pub struct AppEntry {
    pub id: String,
    /// Hosting VPS id
    pub vps: String,
    #[serde(flatten)]
    pub config: AppConfig,
}

// ============================================================================
// ToolSet
// ============================================================================

/// Optional provisioning steps for one VPS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolSet {
    pub package_updates: bool,
    pub package_upgrades: bool,
    pub shell_customization: bool,
    pub docker_engine: bool,
    pub dev_environment: bool,
}

impl ToolSet {
    /// Parse flag names, rejecting unknown ones.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let mut tools = Self::default();
        for name in names {
            match name.as_ref() {
                "package_updates" | "ubuntu_package_updates" => tools.package_updates = true,
                "package_upgrades" | "ubuntu_package_upgrades" => tools.package_upgrades = true,
                "shell_customization" | "oh_my_bash" => tools.shell_customization = true,
                "docker_engine" => tools.docker_engine = true,
                "dev_environment" | "ddev" => tools.dev_environment = true,
                // SSH hardening always runs
                "ssh_config_updates" => {}
                other => bail!(
                    "Unknown tool '{}' (expected one of: {})",
                    other,
                    Self::ALL.join(", ")
                ),
            }
        }
        Ok(tools)
    }

    pub const ALL: [&'static str; 5] = [
        "package_updates",
        "package_upgrades",
        "shell_customization",
        "docker_engine",
        "dev_environment",
    ];

    /// Canonical names of the enabled flags, in pipeline order
    pub fn names(&self) -> Vec<&'static str> {
        let flags = [
            self.package_updates,
            self.package_upgrades,
            self.shell_customization,
            self.docker_engine,
            self.dev_environment,
        ];
        Self::ALL
            .iter()
            .zip(flags)
            .filter(|(_, on)| *on)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Read the `tools` entry of a VPS descriptor
    pub fn from_descriptor(resource: &ResourceDescriptor) -> Result<Self> {
        let names: Vec<String> = match resource.desired_config.get("tools") {
            Some(value) => serde_json::from_value(value.clone())
                .with_context(|| format!("Invalid tools for {}", resource.id))?,
            None => Vec::new(),
        };
        Self::parse(&names)
    }
}

/// Read the `vhosts` entry of a VPS descriptor
pub fn vhosts_of(resource: &ResourceDescriptor) -> Result<Vec<VirtualHost>> {
    match resource.desired_config.get("vhosts") {
        Some(value) => serde_json::from_value(value.clone())
            .with_context(|| format!("Invalid virtual hosts for {}", resource.id)),
        None => Ok(Vec::new()),
    }
}

// ============================================================================
// Loading
// ============================================================================

impl DesiredState {
    /// Load a desired-state file. A missing file means "nothing desired".
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::warn!("No desired-state file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid desired state: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Validate and convert to descriptors: hosts first, then apps.
    pub fn into_resources(self) -> Result<Vec<ResourceDescriptor>> {
        let host_pattern = Regex::new(r"^[A-Za-z0-9*][A-Za-z0-9.*-]*$")?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut resources = Vec::with_capacity(self.vps.len() + self.app.len());

        for vps in self.vps {
            check_id(&vps.id, &mut seen)?;
            let tools = ToolSet::parse(&vps.tools).with_context(|| format!("VPS {}", vps.id))?;

            let kind = if vps.provider == "manual" {
                ResourceKind::Manual
            } else {
                ResourceKind::Vps
            };
            let mut resource = ResourceDescriptor::new(&vps.id, kind, &vps.provider);

            if kind == ResourceKind::Manual {
                let ip = vps
                    .ip
                    .filter(|ip| !ip.trim().is_empty())
                    .with_context(|| format!("Manual host {} needs an `ip`", vps.id))?;
                resource = resource.with_config("ip", ip.trim());
            } else {
                let server_type = vps
                    .server_type
                    .with_context(|| format!("VPS {} needs a `server_type`", vps.id))?;
                vpskit::split_server_type_key(&server_type)
                    .with_context(|| format!("VPS {}", vps.id))?;
                resource = resource.with_config("server_type", server_type);
            }

            if !vps.vhosts.is_empty() && !tools.docker_engine {
                bail!(
                    "VPS {} declares virtual hosts but not the docker_engine tool",
                    vps.id
                );
            }
            for vhost in &vps.vhosts {
                if !host_pattern.is_match(&vhost.host) {
                    bail!("Invalid virtual host name '{}' on {}", vhost.host, vps.id);
                }
            }

            resource = resource.with_config("tools", tools.names());
            if !vps.vhosts.is_empty() {
                resource = resource.with_config("vhosts", serde_json::to_value(&vps.vhosts)?);
            }
            resources.push(resource);
        }

        let hosts: HashSet<String> = resources.iter().map(|r| r.id.clone()).collect();
        // Container names must be unique per host
        let mut containers: HashMap<(String, String), String> = HashMap::new();
        for app in self.app {
            check_id(&app.id, &mut seen)?;
            if !hosts.contains(&app.vps) {
                bail!("App {} runs on unknown VPS '{}'", app.id, app.vps);
            }
            let name = normalize_name(&app.id);
            if let Some(other) = containers.insert((app.vps.clone(), name.clone()), app.id.clone()) {
                bail!(
                    "Apps {} and {} on {} would share the container name '{}'",
                    other,
                    app.id,
                    app.vps,
                    name
                );
            }
            if app.config.image.trim().is_empty() {
                bail!("App {} needs an `image`", app.id);
            }

            let mut resource =
                ResourceDescriptor::new(&app.id, ResourceKind::App, "").with_parent(&app.vps);
            if let Value::Object(map) = serde_json::to_value(&app.config)? {
                resource.desired_config = map;
            }
            resources.push(resource);
        }

        Ok(resources)
    }
}

fn check_id(id: &str, seen: &mut HashSet<String>) -> Result<()> {
    if id.trim().is_empty() {
        bail!("Resource ids must not be empty");
    }
    if !seen.insert(id.to_string()) {
        bail!("Duplicate resource id '{}'", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[vps]]
id = "web-1"
provider = "hetzner"
server_type = "cx22_fsn1"
tools = ["package_updates", "docker_engine", "ssh_config_updates"]

[[vps.vhost]]
host = "app.example.com"
container = "ddev-app-web"
locked = true

[[vps]]
id = "office"
provider = "manual"
ip = " 203.0.113.10 "

[[app]]
id = "uptime"
vps = "web-1"
image = "louislam/uptime-kuma:1"
env = { tz = "UTC" }
ports = [{ external = 3001, internal = 3001 }]
"#;

    #[test]
    fn test_toolset_parse() {
        let tools = ToolSet::parse(&["ddev", "oh_my_bash", "ssh_config_updates"]).unwrap();
        assert!(tools.dev_environment && tools.shell_customization);
        assert!(!tools.docker_engine);
        assert_eq!(tools.names(), vec!["shell_customization", "dev_environment"]);
    }

    #[test]
    fn test_toolset_rejects_unknown() {
        let err = ToolSet::parse(&["docker_engine", "kubernetes"]).unwrap_err();
        assert!(err.to_string().contains("kubernetes"));
    }

    #[test]
    fn test_into_resources() {
        let resources = DesiredState::parse(SAMPLE).unwrap().into_resources().unwrap();
        let ids: Vec<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["web-1", "office", "uptime"]);

        let web = &resources[0];
        assert_eq!(web.kind, ResourceKind::Vps);
        assert_eq!(web.config_str("server_type"), Some("cx22_fsn1"));
        assert!(web.observed_state.is_none());
        let tools = ToolSet::from_descriptor(web).unwrap();
        assert!(tools.package_updates && tools.docker_engine);
        let vhosts = vhosts_of(web).unwrap();
        assert_eq!(vhosts[0].port, 80);
        assert!(vhosts[0].locked);

        let office = &resources[1];
        assert_eq!(office.kind, ResourceKind::Manual);
        assert_eq!(office.config_str("ip"), Some("203.0.113.10"));

        let app = &resources[2];
        assert_eq!(app.kind, ResourceKind::App);
        assert_eq!(app.parent_id.as_deref(), Some("web-1"));
        assert_eq!(app.config_str("image"), Some("louislam/uptime-kuma:1"));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "[[vps]]\nid = \"a\"\nprovider = \"manual\"\n",
            "[[vps]]\nid = \"a\"\nprovider = \"vultr\"\n",
            "[[vps]]\nid = \"a\"\nprovider = \"vultr\"\nserver_type = \"noregion\"\n",
            "[[vps]]\nid = \"a\"\nprovider = \"manual\"\nip = \"1.2.3.4\"\n[[vps]]\nid = \"a\"\nprovider = \"manual\"\nip = \"1.2.3.5\"\n",
            "[[app]]\nid = \"x\"\nvps = \"missing\"\nimage = \"nginx\"\n",
            "[[vps]]\nid = \"a\"\nprovider = \"manual\"\nip = \"1.2.3.4\"\n[[vps.vhost]]\nhost = \"a.b\"\ncontainer = \"c\"\n",
            "[[vps]]\nid = \"a\"\nprovider = \"manual\"\nip = \"1.2.3.4\"\n[[app]]\nid = \"web-1\"\nvps = \"a\"\nimage = \"nginx\"\n[[app]]\nid = \"web1\"\nvps = \"a\"\nimage = \"nginx\"\n",
        ];
        for case in cases {
            let state = DesiredState::parse(case).unwrap();
            assert!(state.into_resources().is_err(), "accepted: {case}");
        }
    }

    #[test]
    fn test_same_container_name_on_different_hosts() {
        let state = DesiredState::parse(
            "[[vps]]\nid = \"a\"\nprovider = \"manual\"\nip = \"1.2.3.4\"\n\
             [[vps]]\nid = \"b\"\nprovider = \"manual\"\nip = \"1.2.3.5\"\n\
             [[app]]\nid = \"web-1\"\nvps = \"a\"\nimage = \"nginx\"\n\
             [[app]]\nid = \"web1\"\nvps = \"b\"\nimage = \"nginx\"\n",
        )
        .unwrap();
        assert_eq!(state.into_resources().unwrap().len(), 4);
    }

    #[test]
    fn test_unknown_vps_field_rejected() {
        assert!(DesiredState::parse("[[vps]]\nid = \"a\"\nprovider = \"manual\"\nsize = 1\n").is_err());
    }
}
