//! DigitalOcean adapter.

use super::{
    ProviderAdapter, id_string, id_value, is_present, observed_id, resume, status_of,
    unwrap_envelope, wait_until_ready,
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

/// DigitalOcean API base URL.
pub const API_BASE: &str = "https://api.digitalocean.com/v2";

const KEY: &str = "digitalocean";
const PAGE_SIZE: u32 = 200;

/// DigitalOcean droplet adapter. Boots the newest Ubuntu x64 image.
pub struct DigitalOceanAdapter {
    transport: Arc<dyn Transport>,
    poll: PollConfig,
}

impl DigitalOceanAdapter {
    /// Create an adapter over an existing transport.
    pub fn new(transport: Arc<dyn Transport>, poll: PollConfig) -> Self {
        Self { transport, poll }
    }

    /// Create an adapter talking HTTP to the DigitalOcean API.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let token = settings.require_token(KEY)?;
        let base = settings.api_base.as_deref().unwrap_or(API_BASE);
        Ok(Self::new(
            Arc::new(HttpTransport::new(KEY, base, token)),
            settings.poll,
        ))
    }

    fn fetch_droplet(&self, id: &str) -> Result<(Value, String)> {
        let body = self.transport.get(&format!("droplets/{id}"))?;
        let droplet = unwrap_envelope(KEY, body, "droplet")?;
        let status = status_of(&droplet);
        Ok((droplet, status))
    }

    fn sizes(&self) -> Result<Vec<Size>> {
        let mut sizes = Vec::new();
        let mut page = 1;
        loop {
            let body = self
                .transport
                .get(&format!("sizes?per_page={PAGE_SIZE}&page={page}"))?;
            let response: SizesResponse = serde_json::from_value(body)?;
            sizes.extend(response.sizes);

            if response.links.pages.next.is_none() {
                return Ok(sizes);
            }
            page += 1;
        }
    }
}

impl ProviderAdapter for DigitalOceanAdapter {
    fn key(&self) -> &'static str {
        KEY
    }

    fn display_name(&self) -> &'static str {
        "DigitalOcean"
    }

    fn list_server_types(&self) -> Result<Vec<ServerType>> {
        let regions: RegionsResponse =
            serde_json::from_value(self.transport.get(&format!("regions?per_page={PAGE_SIZE}"))?)?;
        let by_slug: HashMap<&str, &Region> = regions
            .regions
            .iter()
            .filter(|r| r.available)
            .map(|r| (r.slug.as_str(), r))
            .collect();

        let mut entries = Vec::new();
        for size in self.sizes()?.iter().filter(|s| s.available) {
            let specs = format!(
                "{} core(s), {} MB RAM, {} GB SSD, {} TB traffic",
                size.vcpus, size.memory, size.disk, size.transfer
            );
            for slug in &size.regions {
                let Some(region) = by_slug.get(slug.as_str()) else {
                    continue;
                };
                entries.push(ServerType::new(
                    &size.slug,
                    &region.slug,
                    &region.name,
                    (size.price_monthly, size.price_hourly),
                    "USD",
                    specs.clone(),
                ));
            }
        }

        sort_server_types(&mut entries);
        Ok(entries)
    }

    fn resolve_boot_image(&self, architecture: &str) -> Result<String> {
        let suffix = match architecture {
            "x86" | "x64" | "x86_64" | "amd64" => "-x64",
            other => {
                return Err(Error::Unsupported {
                    provider: KEY.to_string(),
                    operation: format!("{other} images"),
                });
            }
        };

        let body = self
            .transport
            .get(&format!("images?type=distribution&per_page={PAGE_SIZE}"))?;
        let images: ImagesResponse = serde_json::from_value(body)?;

        images
            .images
            .into_iter()
            .filter(|i| i.distribution.eq_ignore_ascii_case("ubuntu"))
            .filter_map(|i| i.slug)
            .filter(|slug| slug.ends_with(suffix))
            .max()
            .ok_or_else(|| Error::Unsupported {
                provider: KEY.to_string(),
                operation: "Ubuntu images".to_string(),
            })
    }

    fn create_key(&self, key_name: &str, public_key: &str) -> Result<KeyHandle> {
        let body = self.transport.post(
            "account/keys",
            &json!({ "name": key_name, "public_key": public_key }),
        )?;
        let key = unwrap_envelope(KEY, body, "ssh_key")?;
        Ok(KeyHandle {
            id: id_string(key.get("id"))
                .ok_or_else(|| Error::missing("id", "digitalocean ssh_key"))?,
            name: key_name.to_string(),
            public_key: public_key.to_string(),
        })
    }

    fn delete_key(&self, handle: &KeyHandle) -> Result<()> {
        self.transport.delete(&format!("account/keys/{}", handle.id))
    }

    fn create(&self, existing: Option<&Value>, request: &CreateRequest) -> Result<Value> {
        if let Some(recorded) = existing.filter(|o| is_present(Some(*o))) {
            return resume(KEY, "active", &self.poll, recorded, |id| self.fetch_droplet(id));
        }

        let (size, region) = request.plan_and_region()?;
        let image = self.resolve_boot_image("x86")?;
        let ssh_keys: Vec<Value> = request.key.iter().map(|k| id_value(&k.id)).collect();

        let body = self.transport.post(
            "droplets",
            &json!({
                "name": request.name,
                "region": region,
                "size": size,
                "image": image,
                "ssh_keys": ssh_keys,
                "backups": false,
                "ipv6": true,
            }),
        )?;

        let droplet = unwrap_envelope(KEY, body, "droplet")?;
        let id = observed_id(KEY, &droplet)?;
        log::info!("Created droplet {} ({})", request.name, id);
        let status = status_of(&droplet);

        wait_until_ready(KEY, &id, "active", &self.poll, (droplet, status), || {
            self.fetch_droplet(&id)
        })
    }

    fn delete(&self, observed: &Value) -> Result<()> {
        let id = observed_id(KEY, observed)?;
        self.transport.delete(&format!("droplets/{id}"))
    }

    fn public_address(&self, observed: &Value) -> Option<String> {
        observed
            .pointer("/networks/v4")?
            .as_array()?
            .iter()
            .find(|n| n.get("type").and_then(Value::as_str) == Some("public"))
            .and_then(|n| n.get("ip_address"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// =============================================================================
// DigitalOcean API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RegionsResponse {
    regions: Vec<Region>,
}

#[derive(Debug, Deserialize)]
struct Region {
    slug: String,
    name: String,
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Deserialize)]
struct SizesResponse {
    sizes: Vec<Size>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Pages,
}

#[derive(Debug, Default, Deserialize)]
struct Pages {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Size {
    slug: String,
    #[serde(default)]
    memory: u64,
    #[serde(default)]
    vcpus: u32,
    #[serde(default)]
    disk: u64,
    #[serde(default)]
    transfer: f64,
    price_monthly: f64,
    price_hourly: f64,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(default)]
    distribution: String,
    slug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Method, MockTransport};
    use std::time::Duration;

    fn adapter(mock: &MockTransport) -> DigitalOceanAdapter {
        DigitalOceanAdapter::new(
            Arc::new(mock.clone()),
            PollConfig {
                interval: Duration::ZERO,
                timeout: Duration::from_secs(60),
            },
        )
    }

    fn size(slug: &str, monthly: f64, regions: &[&str]) -> Value {
        json!({
            "slug": slug, "memory": 1024, "vcpus": 1, "disk": 25, "transfer": 1.0,
            "price_monthly": monthly, "price_hourly": monthly / 744.0,
            "regions": regions, "available": true
        })
    }

    #[test]
    fn test_list_server_types_cross_joins_available_regions() {
        let mock = MockTransport::new(KEY)
            .on(
                Method::Get,
                "regions?per_page=200",
                json!({ "regions": [
                    { "slug": "nyc1", "name": "New York 1", "available": true },
                    { "slug": "sfo1", "name": "San Francisco 1", "available": false },
                    { "slug": "ams3", "name": "Amsterdam 3", "available": true }
                ]}),
            )
            .on(
                Method::Get,
                "sizes?per_page=200&page=1",
                json!({
                    "sizes": [size("s-2vcpu-2gb", 18.0, &["nyc1", "sfo1"])],
                    "links": { "pages": { "next": "https://api.digitalocean.com/v2/sizes?page=2" } }
                }),
            )
            .on(
                Method::Get,
                "sizes?per_page=200&page=2",
                json!({ "sizes": [size("s-1vcpu-1gb", 6.0, &["nyc1", "ams3"])], "links": {} }),
            );

        let types = adapter(&mock).list_server_types().unwrap();
        let keys: Vec<&str> = types.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["s-1vcpu-1gb_ams3", "s-1vcpu-1gb_nyc1", "s-2vcpu-2gb_nyc1"]
        );
        assert_eq!(types[1].location, "New York 1");
        assert_eq!(types[1].specs, "1 core(s), 1024 MB RAM, 25 GB SSD, 1 TB traffic");
    }

    #[test]
    fn test_resolve_boot_image() {
        let mock = MockTransport::new(KEY).on(
            Method::Get,
            "images?type=distribution&per_page=200",
            json!({ "images": [
                { "distribution": "Ubuntu", "slug": "ubuntu-22-04-x64" },
                { "distribution": "Ubuntu", "slug": "ubuntu-24-04-x64" },
                { "distribution": "Debian", "slug": "debian-12-x64" },
                { "distribution": "Ubuntu", "slug": null }
            ]}),
        );
        let a = adapter(&mock);
        assert_eq!(a.resolve_boot_image("x86").unwrap(), "ubuntu-24-04-x64");
        assert!(a.resolve_boot_image("arm").is_err());
    }

    #[test]
    fn test_create_waits_for_active_and_reads_public_ip() {
        let mock = MockTransport::new(KEY)
            .on(
                Method::Get,
                "images?type=distribution&per_page=200",
                json!({ "images": [{ "distribution": "Ubuntu", "slug": "ubuntu-24-04-x64" }] }),
            )
            .on(
                Method::Post,
                "droplets",
                json!({ "droplet": { "id": 3164444, "status": "new" } }),
            )
            .on(
                Method::Get,
                "droplets/3164444",
                json!({ "droplet": {
                    "id": 3164444, "status": "active",
                    "networks": { "v4": [
                        { "ip_address": "10.128.0.2", "type": "private" },
                        { "ip_address": "104.236.32.182", "type": "public" }
                    ]}
                }}),
            );

        let a = adapter(&mock);
        let request = CreateRequest::new("vps-1", "s-1vcpu-1gb_nyc1").with_key(
            "ssh-rsa AAA",
            Some(KeyHandle {
                id: "512189".into(),
                name: "op".into(),
                public_key: "ssh-rsa AAA".into(),
            }),
        );
        let observed = a.create(None, &request).unwrap();

        assert_eq!(a.public_address(&observed).as_deref(), Some("104.236.32.182"));
        let body = mock.last_body("droplets").unwrap();
        assert_eq!(body["size"], "s-1vcpu-1gb");
        assert_eq!(body["region"], "nyc1");
        assert_eq!(body["ssh_keys"], json!([512_189]));
    }
}
