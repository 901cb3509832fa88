//! Hetzner Cloud adapter.

use super::{
    ProviderAdapter, id_string, id_value, is_present, observed_id, price, status_of,
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

/// Hetzner Cloud API base URL.
pub const API_BASE: &str = "https://api.hetzner.cloud/v1";

const KEY: &str = "hetzner";

/// Hetzner Cloud adapter.
///
/// Plans are listed per location with gross prices in the account
/// currency. Boot images are the newest Ubuntu for the plan's architecture.
pub struct HetznerAdapter {
    transport: Arc<dyn Transport>,
    poll: PollConfig,
}

impl HetznerAdapter {
    /// Create an adapter over an existing transport.
    pub fn new(transport: Arc<dyn Transport>, poll: PollConfig) -> Self {
        Self { transport, poll }
    }

    /// Create an adapter talking HTTP to the Hetzner API.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self> {
        let token = settings.require_token(KEY)?;
        let base = settings.api_base.as_deref().unwrap_or(API_BASE);
        Ok(Self::new(
            Arc::new(HttpTransport::new(KEY, base, token)),
            settings.poll,
        ))
    }

    fn architecture_of(&self, plan: &str) -> Result<String> {
        let body = self.transport.get(&format!("server_types?name={plan}"))?;
        body.pointer("/server_types/0/architecture")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::missing("architecture", format!("hetzner server type {plan}")))
    }

    fn fetch_server(&self, id: &str) -> Result<(Value, String)> {
        let server = unwrap_envelope(KEY, self.transport.get(&format!("servers/{id}"))?, "server")?;
        let status = status_of(&server);
        Ok((server, status))
    }
}

impl ProviderAdapter for HetznerAdapter {
    fn key(&self) -> &'static str {
        KEY
    }

    fn display_name(&self) -> &'static str {
        "Hetzner"
    }

    fn list_server_types(&self) -> Result<Vec<ServerType>> {
        let currency = self
            .transport
            .get("pricing")?
            .pointer("/pricing/currency")
            .and_then(Value::as_str)
            .unwrap_or("EUR")
            .to_string();

        let locations: LocationsResponse = serde_json::from_value(self.transport.get("locations")?)?;
        let by_name: HashMap<&str, &Location> =
            locations.locations.iter().map(|l| (l.name.as_str(), l)).collect();

        let mut entries = Vec::new();
        let mut endpoint = "server_types".to_string();
        loop {
            let page: ServerTypesResponse = serde_json::from_value(self.transport.get(&endpoint)?)?;

            for server in &page.server_types {
                let specs = server.specs();
                for p in &server.prices {
                    let Some(location) = by_name.get(p.location.as_str()) else {
                        continue;
                    };
                    let monthly = price(&p.price_monthly.gross).unwrap_or_default();
                    if monthly <= 0.0 {
                        continue;
                    }
                    let hourly = price(&p.price_hourly.gross).unwrap_or_default();
                    let traffic_tb = p.included_traffic.unwrap_or(0) / 1_000_000_000_000;

                    entries.push(ServerType::new(
                        &server.name,
                        &location.name,
                        location.display(),
                        (monthly, hourly),
                        &currency,
                        format!("{specs}, {traffic_tb} TB traffic"),
                    ));
                }
            }

            match page.meta.pagination.next_page {
                Some(next) => endpoint = format!("server_types?page={next}"),
                None => break,
            }
        }

        sort_server_types(&mut entries);
        Ok(entries)
    }

    fn resolve_boot_image(&self, architecture: &str) -> Result<String> {
        let body = self.transport.get(&format!(
            "images?type=system&status=available&os_flavor=ubuntu&architecture={architecture}"
        ))?;
        let images: ImagesResponse = serde_json::from_value(body)?;

        images
            .images
            .into_iter()
            .filter(|i| i.name.as_deref().is_some_and(|n| n.starts_with("ubuntu")))
            .max_by(|a, b| a.name.cmp(&b.name))
            .map(|i| i.id.to_string())
            .ok_or_else(|| Error::Unsupported {
                provider: KEY.to_string(),
                operation: format!("Ubuntu images for {architecture}"),
            })
    }

    fn create_key(&self, key_name: &str, public_key: &str) -> Result<KeyHandle> {
        let body = self.transport.post(
            "ssh_keys",
            &json!({ "name": key_name, "public_key": public_key }),
        )?;
        let key = unwrap_envelope(KEY, body, "ssh_key")?;
        Ok(KeyHandle {
            id: id_string(key.get("id")).ok_or_else(|| Error::missing("id", "hetzner ssh_key"))?,
            name: key_name.to_string(),
            public_key: public_key.to_string(),
        })
    }

    fn delete_key(&self, handle: &KeyHandle) -> Result<()> {
        self.transport.delete(&format!("ssh_keys/{}", handle.id))
    }

    fn create(&self, existing: Option<&Value>, request: &CreateRequest) -> Result<Value> {
        if let Some(recorded) = existing.filter(|o| is_present(Some(*o))) {
            return resume(KEY, "running", &self.poll, recorded, |id| self.fetch_server(id));
        }

        let (plan, location) = request.plan_and_region()?;
        let image = self.resolve_boot_image(&self.architecture_of(plan)?)?;
        let ssh_keys: Vec<Value> = request.key.iter().map(|k| id_value(&k.id)).collect();

        let body = self.transport.post(
            "servers",
            &json!({
                "name": request.name,
                "location": location,
                "server_type": plan,
                "image": id_value(&image),
                "start_after_create": true,
                "public_net": { "enable_ipv4": true, "enable_ipv6": true },
                "ssh_keys": ssh_keys,
            }),
        )?;

        let server = unwrap_envelope(KEY, body, "server")?;
        let id = observed_id(KEY, &server)?;
        log::info!("Created hetzner server {} ({})", request.name, id);
        let status = status_of(&server);

        wait_until_ready(KEY, &id, "running", &self.poll, (server, status), || {
            self.fetch_server(&id)
        })
    }

    fn delete(&self, observed: &Value) -> Result<()> {
        let id = observed_id(KEY, observed)?;
        self.transport.delete(&format!("servers/{id}"))
    }

    fn public_address(&self, observed: &Value) -> Option<String> {
        observed
            .pointer("/public_net/ipv4/ip")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// =============================================================================
// Hetzner API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    locations: Vec<Location>,
}

#[derive(Debug, Deserialize)]
struct Location {
    name: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    network_zone: String,
}

impl Location {
    fn display(&self) -> String {
        format!("{}, {} ({})", self.city, self.country, self.network_zone)
    }
}

#[derive(Debug, Deserialize)]
struct ServerTypesResponse {
    server_types: Vec<HetznerServerType>,
    #[serde(default)]
    meta: Meta,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    next_page: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HetznerServerType {
    name: String,
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    cores: u32,
    #[serde(default)]
    memory: f64,
    #[serde(default)]
    disk: f64,
    category: Option<String>,
    #[serde(default)]
    prices: Vec<LocationPrice>,
}

impl HetznerServerType {
    fn specs(&self) -> String {
        let mut parts = vec![
            self.architecture.clone(),
            format!("{} core(s)", self.cores),
            format!("{} GB RAM", self.memory),
            format!("{} GB SSD", self.disk),
        ];
        if let Some(category) = &self.category {
            parts.push(category.clone());
        }
        parts.join(", ")
    }
}

#[derive(Debug, Deserialize)]
struct LocationPrice {
    location: String,
    price_hourly: Gross,
    price_monthly: Gross,
    included_traffic: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Gross {
    gross: Value,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    id: u64,
    name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyHandleStore, MemoryKeyStore};
    use crate::transport::{Method, MockTransport};
    use std::time::Duration;

    fn fast_poll() -> PollConfig {
        PollConfig {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(60),
        }
    }

    fn adapter(mock: &MockTransport) -> HetznerAdapter {
        HetznerAdapter::new(Arc::new(mock.clone()), fast_poll())
    }

    fn server_type(name: &str, monthly: &str, hourly: &str) -> Value {
        json!({
            "id": 1, "name": name, "architecture": "x86", "cores": 2,
            "memory": 4.0, "disk": 40, "category": "shared",
            "prices": [{
                "location": "fsn1",
                "price_hourly": { "gross": hourly },
                "price_monthly": { "gross": monthly },
                "included_traffic": 20_000_000_000_000_u64
            }]
        })
    }

    fn catalog_mock() -> MockTransport {
        MockTransport::new(KEY)
            .on(Method::Get, "pricing", json!({ "pricing": { "currency": "EUR" } }))
            .on(
                Method::Get,
                "locations",
                json!({ "locations": [{
                    "id": 1, "name": "fsn1", "city": "Falkenstein",
                    "country": "DE", "network_zone": "eu-central"
                }]}),
            )
            .on(
                Method::Get,
                "server_types",
                json!({
                    "server_types": [server_type("cx42", "18.5900000000", "0.0298000000")],
                    "meta": { "pagination": { "next_page": 2 } }
                }),
            )
            .on(
                Method::Get,
                "server_types?page=2",
                json!({
                    "server_types": [server_type("cx22", "4.5100000000", "0.0070000000")],
                    "meta": { "pagination": { "next_page": null } }
                }),
            )
    }

    #[test]
    fn test_list_server_types_paginates_and_sorts() {
        let mock = catalog_mock();
        let types = adapter(&mock).list_server_types().unwrap();

        assert_eq!(types.len(), 2);
        assert_eq!(types[0].key, "cx22_fsn1");
        assert_eq!(types[0].price_label, "4.5100 EUR/mo (0.00700 EUR/hr)");
        assert_eq!(types[0].location, "Falkenstein, DE (eu-central)");
        assert_eq!(
            types[0].specs,
            "x86, 2 core(s), 4 GB RAM, 40 GB SSD, shared, 20 TB traffic"
        );
        assert_eq!(types[1].key, "cx42_fsn1");
    }

    #[test]
    fn test_resolve_boot_image_picks_newest_ubuntu() {
        let mock = MockTransport::new(KEY).on(
            Method::Get,
            "images?type=system&status=available&os_flavor=ubuntu&architecture=arm",
            json!({ "images": [
                { "id": 10, "name": "ubuntu-22.04" },
                { "id": 11, "name": "ubuntu-24.04" },
                { "id": 12, "name": null }
            ]}),
        );
        assert_eq!(adapter(&mock).resolve_boot_image("arm").unwrap(), "11");
    }

    #[test]
    fn test_create_polls_until_running() {
        let mock = MockTransport::new(KEY)
            .on(
                Method::Get,
                "server_types?name=cx22",
                json!({ "server_types": [{ "architecture": "x86" }] }),
            )
            .on(
                Method::Get,
                "images?type=system&status=available&os_flavor=ubuntu&architecture=x86",
                json!({ "images": [{ "id": 7, "name": "ubuntu-24.04" }] }),
            )
            .on(
                Method::Post,
                "servers",
                json!({ "server": { "id": 42, "status": "initializing" } }),
            )
            .on(Method::Get, "servers/42", json!({ "server": { "id": 42, "status": "starting" } }))
            .on(
                Method::Get,
                "servers/42",
                json!({ "server": {
                    "id": 42, "status": "running",
                    "public_net": { "ipv4": { "ip": "203.0.113.5" } }
                }}),
            );

        let a = adapter(&mock);
        let request = CreateRequest::new("vps-1", "cx22_fsn1").with_key(
            "ssh-rsa AAA",
            Some(KeyHandle {
                id: "99".into(),
                name: "op".into(),
                public_key: "ssh-rsa AAA".into(),
            }),
        );
        let observed = a.create(None, &request).unwrap();

        assert_eq!(observed["status"], "running");
        assert_eq!(a.public_address(&observed).as_deref(), Some("203.0.113.5"));
        let body = mock.last_body("servers").unwrap();
        assert_eq!(body["location"], "fsn1");
        assert_eq!(body["server_type"], "cx22");
        assert_eq!(body["image"], 7);
        assert_eq!(body["ssh_keys"], json!([99]));
        assert_eq!(mock.count(Method::Get, "servers/42"), 2);
    }

    #[test]
    fn test_create_is_noop_when_observed() {
        let mock = MockTransport::new(KEY);
        let existing = json!({ "id": 42 });
        let observed = adapter(&mock)
            .create(Some(&existing), &CreateRequest::new("vps-1", "cx22_fsn1"))
            .unwrap();
        assert_eq!(observed, existing);
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_create_timeout_keeps_server_then_resumes() {
        let mock = MockTransport::new(KEY)
            .on(
                Method::Get,
                "server_types?name=cx22",
                json!({ "server_types": [{ "architecture": "x86" }] }),
            )
            .on(
                Method::Get,
                "images?type=system&status=available&os_flavor=ubuntu&architecture=x86",
                json!({ "images": [{ "id": 7, "name": "ubuntu-24.04" }] }),
            )
            .on(
                Method::Post,
                "servers",
                json!({ "server": { "id": 42, "status": "initializing" } }),
            )
            .on(Method::Get, "servers/42", json!({ "server": { "id": 42, "status": "running" } }));
        let impatient = HetznerAdapter::new(
            Arc::new(mock.clone()),
            PollConfig {
                interval: Duration::ZERO,
                timeout: Duration::ZERO,
            },
        );
        let request = CreateRequest::new("vps-1", "cx22_fsn1");

        let err = impatient.create(None, &request).unwrap_err();
        let unfinished = err.unfinished_server().unwrap().clone();
        assert_eq!(unfinished["id"], 42);

        let observed = adapter(&mock).create(Some(&unfinished), &request).unwrap();
        assert_eq!(observed["status"], "running");
        assert_eq!(mock.count(Method::Post, "servers"), 1);
    }

    #[test]
    fn test_create_error_is_not_retried() {
        let mock = MockTransport::new(KEY)
            .on(
                Method::Get,
                "server_types?name=cx22",
                json!({ "server_types": [{ "architecture": "x86" }] }),
            )
            .on(
                Method::Get,
                "images?type=system&status=available&os_flavor=ubuntu&architecture=x86",
                json!({ "images": [{ "id": 7, "name": "ubuntu-24.04" }] }),
            )
            .on_status(Method::Post, "servers", 422, "invalid location");

        let err = adapter(&mock)
            .create(None, &CreateRequest::new("vps-1", "cx22_fsn1"))
            .unwrap_err();
        assert!(matches!(err, Error::Provider { status: 422, .. }));
        assert_eq!(mock.count(Method::Post, "servers"), 1);
    }

    #[test]
    fn test_delete_requires_id() {
        let mock = MockTransport::new(KEY).on(Method::Delete, "servers/42", Value::Null);
        let a = adapter(&mock);
        a.delete(&json!({ "id": 42 })).unwrap();
        assert!(matches!(
            a.delete(&json!({})).unwrap_err(),
            Error::MissingField { .. }
        ));
    }

    #[test]
    fn test_upload_key_is_idempotent() {
        let mock = MockTransport::new(KEY).on(
            Method::Post,
            "ssh_keys",
            json!({ "ssh_key": { "id": 5, "name": "op", "public_key": "ssh-rsa AAA" } }),
        );
        let store = MemoryKeyStore::new();
        let a = adapter(&mock);

        let first = a.upload_key(&store, "op", "ssh-rsa AAA").unwrap();
        let second = a.upload_key(&store, "op", "ssh-rsa AAA\n").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.id, "5");
        assert_eq!(mock.count(Method::Post, "ssh_keys"), 1);
        assert_eq!(store.key_handle(KEY), Some(first));
    }

    #[test]
    fn test_changed_key_replaces_previous() {
        let mock = MockTransport::new(KEY)
            .on_status(Method::Delete, "ssh_keys/5", 404, "not found")
            .on(
                Method::Post,
                "ssh_keys",
                json!({ "ssh_key": { "id": 6 } }),
            );
        let store = MemoryKeyStore::new();
        store
            .store_key_handle(
                KEY,
                &KeyHandle {
                    id: "5".into(),
                    name: "op".into(),
                    public_key: "ssh-rsa OLD".into(),
                },
            )
            .unwrap();

        let handle = adapter(&mock).upload_key(&store, "op", "ssh-rsa NEW").unwrap();

        assert_eq!(handle.id, "6");
        assert_eq!(mock.count(Method::Delete, "ssh_keys/5"), 1);
        assert_eq!(store.key_handle(KEY).unwrap().public_key, "ssh-rsa NEW");
    }
}
