//! Provider adapters.
//!
//! Each supported vendor has an adapter implementing [`ProviderAdapter`].
//! Adapters talk to their vendor through an injected
//! [`Transport`](crate::transport::Transport), so every adapter can be
//! exercised against a [`MockTransport`](crate::transport::MockTransport).

pub mod digitalocean;
pub mod hetzner;
pub mod linode;
pub mod manual;
pub mod vultr;

pub use digitalocean::DigitalOceanAdapter;
pub use hetzner::HetznerAdapter;
pub use linode::LinodeAdapter;
pub use manual::ManualAdapter;
pub use vultr::VultrAdapter;

use crate::error::{Error, Result};
use crate::keys::{self, KeyHandleStore};
use crate::types::{CreateRequest, KeyHandle, PollConfig, ServerType};
use serde_json::Value;
use std::thread;
use std::time::Instant;

/// Capabilities shared by every VPS vendor.
pub trait ProviderAdapter: Send + Sync {
    /// Registry key (`hetzner`, `vultr`, ...).
    fn key(&self) -> &'static str;

    /// Display name.
    fn display_name(&self) -> &'static str;

    /// Every plan × region combination on offer, cheapest first.
    fn list_server_types(&self) -> Result<Vec<ServerType>>;

    /// Newest boot image of the adapter's OS family for `architecture`.
    fn resolve_boot_image(&self, architecture: &str) -> Result<String>;

    /// Upload `public_key` under `key_name`.
    fn create_key(&self, key_name: &str, public_key: &str) -> Result<KeyHandle>;

    /// Remove a previously uploaded key.
    fn delete_key(&self, handle: &KeyHandle) -> Result<()>;

    /// Upload the operator key unless the stored handle already matches.
    fn upload_key(
        &self,
        store: &dyn KeyHandleStore,
        key_name: &str,
        public_key: &str,
    ) -> Result<KeyHandle> {
        keys::sync_key(self, store, key_name, public_key)
    }

    /// Create a server and wait for it to run.
    ///
    /// Returns `existing` untouched when it already describes a server.
    fn create(&self, existing: Option<&Value>, request: &CreateRequest) -> Result<Value>;

    /// Delete the server described by `observed`.
    fn delete(&self, observed: &Value) -> Result<()>;

    /// Public IPv4 address from an observed descriptor.
    fn public_address(&self, observed: &Value) -> Option<String>;
}

/// Whether an observed descriptor describes an existing server.
pub fn is_present(observed: Option<&Value>) -> bool {
    match observed {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Provider-assigned id of an observed descriptor, numeric or string.
pub(crate) fn observed_id(provider: &str, observed: &Value) -> Result<String> {
    id_string(observed.get("id"))
        .ok_or_else(|| Error::missing("id", format!("{provider} server record")))
}

pub(crate) fn id_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pass a numeric-looking id as a JSON number, anything else as a string.
pub(crate) fn id_value(id: &str) -> Value {
    id.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(id))
}

/// Take `field` out of a response envelope.
pub(crate) fn unwrap_envelope(provider: &str, mut body: Value, field: &str) -> Result<Value> {
    match body.get_mut(field).map(Value::take) {
        Some(inner) if !inner.is_null() => Ok(inner),
        _ => Err(Error::missing(field, format!("{provider} response"))),
    }
}

/// Parse a price given either as a JSON number or a decimal string.
pub(crate) fn price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Poll until the server reports `ready`, or fail after `poll.timeout`.
///
/// `current` is the descriptor returned by the create call; `fetch`
/// re-reads the descriptor. Both are `(descriptor, status)` pairs.
pub(crate) fn wait_until_ready<F>(
    provider: &str,
    id: &str,
    ready: &str,
    poll: &PollConfig,
    mut current: (Value, String),
    mut fetch: F,
) -> Result<Value>
where
    F: FnMut() -> Result<(Value, String)>,
{
    let started = Instant::now();

    loop {
        let (descriptor, status) = current;
        if status == ready {
            log::info!("{} server {} is {}", provider, id, status);
            return Ok(descriptor);
        }

        if started.elapsed() >= poll.timeout {
            return Err(Error::ProvisioningTimeout {
                provider: provider.to_string(),
                id: id.to_string(),
                status,
                waited_secs: started.elapsed().as_secs(),
                descriptor: Box::new(descriptor),
            });
        }

        log::debug!("{} server {} is {}; waiting", provider, id, status);
        thread::sleep(poll.interval);
        current = fetch()?;
    }
}

/// Continue waiting on a server recorded by an earlier create.
///
/// The server is re-read once before polling. A descriptor without a
/// status is taken as already ready.
pub(crate) fn resume<F>(
    provider: &str,
    ready: &str,
    poll: &PollConfig,
    recorded: &Value,
    mut fetch: F,
) -> Result<Value>
where
    F: FnMut(&str) -> Result<(Value, String)>,
{
    let status = status_of(recorded);
    if status.is_empty() || status == ready {
        return Ok(recorded.clone());
    }

    let id = observed_id(provider, recorded)?;
    log::info!("Resuming wait for {} server {} (last seen {})", provider, id, status);
    let current = fetch(&id)?;
    wait_until_ready(provider, &id, ready, poll, current, || fetch(&id))
}

/// `status` field of a descriptor.
pub(crate) fn status_of(descriptor: &Value) -> String {
    descriptor
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
