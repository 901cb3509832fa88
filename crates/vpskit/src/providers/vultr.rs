//! Vultr adapter.

use super::{
    ProviderAdapter, id_string, is_present, observed_id, status_of,
    resume, unwrap_envelope, wait_until_ready,
};
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    CreateRequest, KeyHandle, PollConfig, ProviderSettings, ServerType, sort_server_types,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// Vultr API base URL.
pub const API_BASE: &str = "https://api.vultr.com/v2";

const KEY: &str = "vultr";

/// Vultr instance adapter. Boots the newest Debian image.
pub struct VultrAdapter {
    transport: Arc<dyn Transport>,
    poll: PollConfig,
}

impl VultrAdapter {
    /// Create an adapter over an existing transport.
    pub fn new(transport: Arc<dyn Transport>, poll: PollConfig) -> Self {
        Self { transport, poll }
    }

    /// Create an adapter talking HTTP to the Vultr API.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let token = settings.require_token(KEY)?;
        let base = settings.api_base.as_deref().unwrap_or(API_BASE);
        Ok(Self::new(
            Arc::new(HttpTransport::new(KEY, base, token)),
            settings.poll,
        ))
    }

    fn fetch_instance(&self, id: &str) -> Result<(Value, String)> {
        let body = self.transport.get(&format!("instances/{id}"))?;
        let instance = unwrap_envelope(KEY, body, "instance")?;
        let status = status_of(&instance);
        Ok((instance, status))
    }

    fn plans(&self) -> Result<Vec<Plan>> {
        let mut plans = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let body = match &cursor {
                Some(cursor) => self.transport.get_query("plans", &[("cursor", cursor.as_str())])?,
                None => self.transport.get("plans")?,
            };
            let response: PlansResponse = serde_json::from_value(body)?;
            plans.extend(response.plans);

            cursor = response.meta.links.next.filter(|c| !c.is_empty());
            if cursor.is_none() {
                return Ok(plans);
            }
        }
    }
}

impl ProviderAdapter for VultrAdapter {
    fn key(&self) -> &'static str {
        KEY
    }

    fn display_name(&self) -> &'static str {
        "Vultr"
    }

    fn list_server_types(&self) -> Result<Vec<ServerType>> {
        let regions: RegionsResponse = serde_json::from_value(self.transport.get("regions")?)?;
        let by_id: HashMap<&str, &Region> =
            regions.regions.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut entries = Vec::new();
        for plan in self.plans()? {
            let specs = plan.specs();
            for region_id in &plan.locations {
                let Some(region) = by_id.get(region_id.as_str()) else {
                    continue;
                };
                entries.push(ServerType::new(
                    &plan.id,
                    &region.id,
                    format!("{}, {}", region.city, region.country),
                    (plan.monthly_cost, plan.hourly_cost),
                    "USD",
                    specs.clone(),
                ));
            }
        }

        sort_server_types(&mut entries);
        Ok(entries)
    }

    fn resolve_boot_image(&self, architecture: &str) -> Result<String> {
        let arch = match architecture {
            "x86" | "x64" | "x86_64" | "amd64" => "x64",
            "arm" | "arm64" | "aarch64" => "arm64",
            other => other,
        };

        let images: OsResponse = serde_json::from_value(self.transport.get("os")?)?;
        images
            .os
            .into_iter()
            .filter(|os| os.family == "debian" && os.arch == arch)
            .map(|os| os.id)
            .max()
            .map(|id| id.to_string())
            .ok_or_else(|| Error::Unsupported {
                provider: KEY.to_string(),
                operation: format!("Debian images for {architecture}"),
            })
    }

    fn create_key(&self, key_name: &str, public_key: &str) -> Result<KeyHandle> {
        let body = self.transport.post(
            "ssh-keys",
            &json!({ "name": key_name, "ssh_key": public_key }),
        )?;
        let key = unwrap_envelope(KEY, body, "ssh_key")?;
        Ok(KeyHandle {
            id: id_string(key.get("id")).ok_or_else(|| Error::missing("id", "vultr ssh_key"))?,
            name: key_name.to_string(),
            public_key: public_key.to_string(),
        })
    }

    fn delete_key(&self, handle: &KeyHandle) -> Result<()> {
        self.transport.delete(&format!("ssh-keys/{}", handle.id))
    }

    fn create(&self, existing: Option<&Value>, request: &CreateRequest) -> Result<Value> {
        if let Some(recorded) = existing.filter(|o| is_present(Some(*o))) {
            return resume(KEY, "active", &self.poll, recorded, |id| self.fetch_instance(id));
        }

        let (plan, region) = request.plan_and_region()?;
        let os_id: u64 = self
            .resolve_boot_image("x86")?
            .parse()
            .map_err(|_| Error::InvalidResponse("non-numeric Vultr os id".to_string()))?;
        let ssh_keys: Vec<&str> = request.key.iter().map(|k| k.id.as_str()).collect();

        let body = self.transport.post(
            "instances",
            &json!({
                "region": region,
                "plan": plan,
                "os_id": os_id,
                "sshkey_id": ssh_keys,
                "label": request.name,
                "hostname": request.name,
                "backups": "disabled",
            }),
        )?;

        let instance = unwrap_envelope(KEY, body, "instance")?;
        let id = observed_id(KEY, &instance)?;
        log::info!("Created vultr instance {} ({})", request.name, id);
        let status = status_of(&instance);

        wait_until_ready(KEY, &id, "active", &self.poll, (instance, status), || {
            self.fetch_instance(&id)
        })
    }

    fn delete(&self, observed: &Value) -> Result<()> {
        let id = observed_id(KEY, observed)?;
        self.transport.delete(&format!("instances/{id}"))
    }

    fn public_address(&self, observed: &Value) -> Option<String> {
        observed
            .get("main_ip")
            .and_then(Value::as_str)
            .filter(|ip| !ip.is_empty() && *ip != "0.0.0.0")
            .map(str::to_string)
    }
}

// =============================================================================
// Vultr API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RegionsResponse {
    regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
struct Region {
    id: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct PlansResponse {
    plans: Vec<Plan>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Plan {
    id: String,
    #[serde(default)]
    vcpu_count: u32,
    #[serde(default)]
    ram: u64,
    #[serde(default)]
    disk: u64,
    #[serde(default)]
    disk_type: Option<String>,
    #[serde(default)]
    bandwidth: u64,
    monthly_cost: f64,
    #[serde(default)]
    hourly_cost: f64,
    cpu_vendor: Option<String>,
    #[serde(default)]
    locations: Vec<String>,
}

impl Plan {
    fn specs(&self) -> String {
        let mut parts = Vec::new();
        if let Some(vendor) = &self.cpu_vendor {
            parts.push(vendor.clone());
        }
        parts.push(format!("{} core(s)", self.vcpu_count));
        parts.push(format!("{} MB RAM", self.ram));
        parts.push(format!(
            "{} GB {}",
            self.disk,
            self.disk_type.as_deref().unwrap_or("SSD")
        ));
        parts.push(format!("{:.1} TB traffic", self.bandwidth as f64 / 1000.0));
        parts.join(", ")
    }
}

#[derive(Debug, Deserialize)]
struct OsResponse {
    os: Vec<Os>,
}

#[derive(Debug, Deserialize)]
struct Os {
    id: u64,
    #[serde(default)]
    arch: String,
    #[serde(default)]
    family: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Method, MockTransport};
    use std::time::Duration;

    fn adapter(mock: &MockTransport) -> VultrAdapter {
        VultrAdapter::new(
            Arc::new(mock.clone()),
            PollConfig {
                interval: Duration::ZERO,
                timeout: Duration::from_secs(60),
            },
        )
    }

    fn os_list() -> Value {
        json!({ "os": [
            { "id": 477, "arch": "x64", "family": "debian" },
            { "id": 2136, "arch": "x64", "family": "debian" },
            { "id": 2137, "arch": "arm64", "family": "debian" },
            { "id": 2284, "arch": "x64", "family": "ubuntu" }
        ]})
    }

    #[test]
    fn test_list_server_types_follows_cursor() {
        let mock = MockTransport::new(KEY)
            .on(
                Method::Get,
                "regions",
                json!({ "regions": [
                    { "id": "ewr", "city": "New Jersey", "country": "US" },
                    { "id": "fra", "city": "Frankfurt", "country": "DE" }
                ]}),
            )
            .on(
                Method::Get,
                "plans",
                json!({
                    "plans": [{
                        "id": "vc2-2c-4gb", "vcpu_count": 2, "ram": 4096, "disk": 80,
                        "disk_type": "SSD", "bandwidth": 3000, "monthly_cost": 20,
                        "hourly_cost": 0.03, "locations": ["ewr"]
                    }],
                    "meta": { "links": { "next": "bmV4dA==", "prev": "" } }
                }),
            )
            .on(
                Method::Get,
                "plans?cursor=bmV4dA==",
                json!({
                    "plans": [{
                        "id": "vc2-1c-1gb", "vcpu_count": 1, "ram": 1024, "disk": 25,
                        "disk_type": "SSD", "bandwidth": 1000, "monthly_cost": 5,
                        "hourly_cost": 0.007, "cpu_vendor": "Intel",
                        "locations": ["ewr", "fra", "xxx"]
                    }],
                    "meta": { "links": { "next": "", "prev": "" } }
                }),
            );

        let types = adapter(&mock).list_server_types().unwrap();
        let keys: Vec<&str> = types.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["vc2-1c-1gb_ewr", "vc2-1c-1gb_fra", "vc2-2c-4gb_ewr"]);
        assert_eq!(
            types[0].specs,
            "Intel, 1 core(s), 1024 MB RAM, 25 GB SSD, 1.0 TB traffic"
        );
        assert_eq!(types[1].location, "Frankfurt, DE");
        assert_eq!(types[2].price_label, "20.0000 USD/mo (0.03000 USD/hr)");
    }

    #[test]
    fn test_resolve_boot_image_picks_highest_debian_id() {
        let mock = MockTransport::new(KEY).on(Method::Get, "os", os_list());
        let a = adapter(&mock);
        assert_eq!(a.resolve_boot_image("x86").unwrap(), "2136");
        assert_eq!(a.resolve_boot_image("arm").unwrap(), "2137");
    }

    #[test]
    fn test_create_and_delete() {
        let mock = MockTransport::new(KEY)
            .on(Method::Get, "os", os_list())
            .on(
                Method::Post,
                "instances",
                json!({ "instance": { "id": "cb676a46", "status": "pending", "main_ip": "0.0.0.0" } }),
            )
            .on(
                Method::Get,
                "instances/cb676a46",
                json!({ "instance": { "id": "cb676a46", "status": "active", "main_ip": "45.77.1.2" } }),
            )
            .on(Method::Delete, "instances/cb676a46", Value::Null);

        let a = adapter(&mock);
        let pending = json!({ "main_ip": "0.0.0.0" });
        assert_eq!(a.public_address(&pending), None);

        let request = CreateRequest::new("vps-1", "vc2-1c-1gb_ewr").with_key(
            "ssh-rsa AAA",
            Some(KeyHandle {
                id: "3b8066a7".into(),
                name: "op".into(),
                public_key: "ssh-rsa AAA".into(),
            }),
        );
        let observed = a.create(None, &request).unwrap();
        assert_eq!(a.public_address(&observed).as_deref(), Some("45.77.1.2"));

        let body = mock.last_body("instances").unwrap();
        assert_eq!(body["os_id"], 2136);
        assert_eq!(body["sshkey_id"], json!(["3b8066a7"]));
        assert_eq!(body["backups"], "disabled");

        a.delete(&observed).unwrap();
        assert_eq!(mock.count(Method::Delete, "instances/cb676a46"), 1);
    }
}
