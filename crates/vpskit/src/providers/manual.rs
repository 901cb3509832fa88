//! Externally managed hosts.
//!
//! The operator owns the machine; devbox only records its address.

use super::{ProviderAdapter, is_present};
use crate::error::{Error, Result};
use crate::keys::KeyHandleStore;
use crate::types::{CreateRequest, KeyHandle, ServerType};
use serde_json::{Value, json};

const KEY: &str = "manual";

/// Adapter for hosts that already exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualAdapter;

impl ManualAdapter {
    /// Create the adapter.
    pub fn new() -> Self {
        Self
    }

    fn unsupported<T>(operation: &str) -> Result<T> {
        Err(Error::Unsupported {
            provider: KEY.to_string(),
            operation: operation.to_string(),
        })
    }
}

impl ProviderAdapter for ManualAdapter {
    fn key(&self) -> &'static str {
        KEY
    }

    fn display_name(&self) -> &'static str {
        "Manual"
    }

    fn list_server_types(&self) -> Result<Vec<ServerType>> {
        Ok(Vec::new())
    }

    fn resolve_boot_image(&self, _architecture: &str) -> Result<String> {
        Self::unsupported("boot images")
    }

    fn create_key(&self, _key_name: &str, _public_key: &str) -> Result<KeyHandle> {
        Self::unsupported("key upload")
    }

    fn delete_key(&self, _handle: &KeyHandle) -> Result<()> {
        Self::unsupported("key deletion")
    }

    fn upload_key(
        &self,
        _store: &dyn KeyHandleStore,
        _key_name: &str,
        _public_key: &str,
    ) -> Result<KeyHandle> {
        Self::unsupported("key upload")
    }

    fn create(&self, existing: Option<&Value>, request: &CreateRequest) -> Result<Value> {
        if let Some(observed) = existing.filter(|o| is_present(Some(*o))) {
            return Ok(observed.clone());
        }

        let address = request
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| Error::missing("ip", format!("manual host {}", request.name)))?;

        log::info!("Recorded manual host {} at {}", request.name, address);
        Ok(json!({ "ip": address }))
    }

    fn delete(&self, _observed: &Value) -> Result<()> {
        Ok(())
    }

    fn public_address(&self, observed: &Value) -> Option<String> {
        observed
            .get("ip")
            .and_then(Value::as_str)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
    }
}
