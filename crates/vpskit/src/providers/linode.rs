//! Linode (Akamai) adapter.

use super::{
    ProviderAdapter, id_string, is_present, observed_id, resume, status_of, wait_until_ready,
};
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    CreateRequest, KeyHandle, PollConfig, ProviderSettings, ServerType, sort_server_types,
    version_order,
};
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;

/// Linode API base URL.
pub const API_BASE: &str = "https://api.linode.com/v4";

const KEY: &str = "linode";

const PAGE_SIZE: &str = "500";

/// Linode instance adapter. Boots the newest Debian image.
pub struct LinodeAdapter {
    transport: Arc<dyn Transport>,
    poll: PollConfig,
}

impl LinodeAdapter {
    /// Create an adapter over an existing transport.
    pub fn new(transport: Arc<dyn Transport>, poll: PollConfig) -> Self {
        Self { transport, poll }
    }

    /// Create an adapter talking HTTP to the Linode API.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let token = settings.require_token(KEY)?;
        let base = settings.api_base.as_deref().unwrap_or(API_BASE);
        Ok(Self::new(
            Arc::new(HttpTransport::new(KEY, base, token)),
            settings.poll,
        ))
    }

    fn fetch_instance(&self, id: &str) -> Result<(Value, String)> {
        let instance = self.transport.get(&format!("linode/instances/{id}"))?;
        let status = status_of(&instance);
        Ok((instance, status))
    }

    /// Every item of a paginated listing.
    fn list_all<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;
        loop {
            let number = page.to_string();
            let body = self
                .transport
                .get_query(endpoint, &[("page", number.as_str()), ("page_size", PAGE_SIZE)])?;
            let response: Paged<T> = serde_json::from_value(body)?;
            items.extend(response.data);

            if page >= response.pages {
                return Ok(items);
            }
            page += 1;
        }
    }
}

/// Linode insists on a root password even for key-only logins. It is never
/// used: the SSH hardening step turns password authentication off.
fn root_password() -> String {
    format!("Dx{}!", uuid::Uuid::new_v4().simple())
}

impl ProviderAdapter for LinodeAdapter {
    fn key(&self) -> &'static str {
        KEY
    }

    fn display_name(&self) -> &'static str {
        "Linode"
    }

    fn list_server_types(&self) -> Result<Vec<ServerType>> {
        let regions: Vec<Region> = self.list_all("regions")?;
        let types: Vec<LinodeType> = self.list_all("linode/types")?;

        let mut entries = Vec::new();
        for region in regions.iter().filter(|r| r.status == "ok") {
            for ty in &types {
                let (monthly, hourly) = ty.price_in(&region.id);
                if monthly <= 0.0 {
                    continue;
                }
                entries.push(ServerType::new(
                    &ty.id,
                    &region.id,
                    format!("{}, {}", region.label, region.country.to_uppercase()),
                    (monthly, hourly),
                    "USD",
                    ty.specs(),
                ));
            }
        }

        sort_server_types(&mut entries);
        Ok(entries)
    }

    fn resolve_boot_image(&self, architecture: &str) -> Result<String> {
        if !matches!(architecture, "x86" | "x64" | "x86_64" | "amd64") {
            return Err(Error::Unsupported {
                provider: KEY.to_string(),
                operation: format!("images for {architecture}"),
            });
        }

        let pattern = Regex::new(r"^linode/debian[0-9]+$")
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;
        let images: Vec<Image> = self.list_all("images")?;

        images
            .into_iter()
            .filter(|i| i.vendor.eq_ignore_ascii_case("debian") && pattern.is_match(&i.id))
            .map(|i| i.id)
            .max_by(|a, b| version_order(a, b))
            .ok_or_else(|| Error::Unsupported {
                provider: KEY.to_string(),
                operation: "Debian images".to_string(),
            })
    }

    fn create_key(&self, key_name: &str, public_key: &str) -> Result<KeyHandle> {
        let key = self.transport.post(
            "profile/sshkeys",
            &json!({ "label": key_name, "ssh_key": public_key }),
        )?;
        Ok(KeyHandle {
            id: id_string(key.get("id")).ok_or_else(|| Error::missing("id", "linode sshkey"))?,
            name: key_name.to_string(),
            public_key: public_key.to_string(),
        })
    }

    fn delete_key(&self, handle: &KeyHandle) -> Result<()> {
        self.transport
            .delete(&format!("profile/sshkeys/{}", handle.id))
    }

    fn create(&self, existing: Option<&Value>, request: &CreateRequest) -> Result<Value> {
        if let Some(recorded) = existing.filter(|o| is_present(Some(*o))) {
            return resume(KEY, "running", &self.poll, recorded, |id| self.fetch_instance(id));
        }

        let (plan, region) = request.plan_and_region()?;
        let image = self.resolve_boot_image("x86")?;

        let instance = self.transport.post(
            "linode/instances",
            &json!({
                "label": request.name,
                "region": region,
                "type": plan,
                "image": image,
                "authorized_keys": [request.public_key.trim()],
                "root_pass": root_password(),
                "booted": true,
                "backups_enabled": false,
            }),
        )?;

        let id = observed_id(KEY, &instance)?;
        log::info!("Created linode {} ({})", request.name, id);
        let status = status_of(&instance);

        wait_until_ready(KEY, &id, "running", &self.poll, (instance, status), || {
            self.fetch_instance(&id)
        })
    }

    fn delete(&self, observed: &Value) -> Result<()> {
        let id = observed_id(KEY, observed)?;
        self.transport.delete(&format!("linode/instances/{id}"))
    }

    fn public_address(&self, observed: &Value) -> Option<String> {
        observed
            .get("ipv4")
            .and_then(Value::as_array)
            .and_then(|ips| ips.first())
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// =============================================================================
// Linode API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Paged<T> {
    data: Vec<T>,
    #[serde(default)]
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct Region {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct LinodeType {
    id: String,
    #[serde(default)]
    vcpus: u32,
    #[serde(default)]
    memory: u64,
    #[serde(default)]
    disk: u64,
    #[serde(default)]
    transfer: u64,
    price: Price,
    #[serde(default)]
    region_prices: Vec<RegionPrice>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Price {
    #[serde(default)]
    monthly: f64,
    #[serde(default)]
    hourly: f64,
}

#[derive(Debug, Deserialize)]
struct RegionPrice {
    id: String,
    #[serde(default)]
    monthly: f64,
    #[serde(default)]
    hourly: f64,
}

impl LinodeType {
    fn price_in(&self, region: &str) -> (f64, f64) {
        self.region_prices
            .iter()
            .find(|p| p.id == region)
            .map_or((self.price.monthly, self.price.hourly), |p| {
                (p.monthly, p.hourly)
            })
    }

    fn specs(&self) -> String {
        format!(
            "{} core(s), {} MB RAM, {} MB disk, {} TB traffic",
            self.vcpus,
            self.memory,
            self.disk,
            self.transfer / 1000
        )
    }
}

#[derive(Debug, Deserialize)]
struct Image {
    id: String,
    #[serde(default)]
    vendor: String,
}
