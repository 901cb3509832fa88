//! Provider lookup by key.

use crate::error::{Error, Result};
use crate::providers::{
    DigitalOceanAdapter, HetznerAdapter, LinodeAdapter, ManualAdapter, ProviderAdapter,
    VultrAdapter,
};
use crate::types::ProviderSettings;
use std::collections::BTreeMap;

type Factory = Box<dyn Fn(&ProviderSettings) -> Result<Box<dyn ProviderAdapter>> + Send + Sync>;

/// Maps provider keys to adapter constructors.
///
/// Adapters are built on demand so that a missing token for one vendor
/// does not prevent using another.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Factory>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter.
    pub fn with_defaults() -> Self {
        Self::new()
            .register("digitalocean", |s| {
                Ok(Box::new(DigitalOceanAdapter::from_settings(s)?))
            })
            .register("hetzner", |s| Ok(Box::new(HetznerAdapter::from_settings(s)?)))
            .register("linode", |s| Ok(Box::new(LinodeAdapter::from_settings(s)?)))
            .register("manual", |_| Ok(Box::new(ManualAdapter::new())))
            .register("vultr", |s| Ok(Box::new(VultrAdapter::from_settings(s)?)))
    }

    /// Add or replace the constructor for `key`.
    #[must_use]
    pub fn register<F>(mut self, key: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ProviderSettings) -> Result<Box<dyn ProviderAdapter>> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Box::new(factory));
        self
    }

    /// Build the adapter registered under `key`.
    pub fn create(&self, key: &str, settings: &ProviderSettings) -> Result<Box<dyn ProviderAdapter>> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| Error::UnknownProvider(key.to_string()))?;
        factory(settings)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Whether `key` is registered.
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(
            registry.keys(),
            vec!["digitalocean", "hetzner", "linode", "manual", "vultr"]
        );
        assert!(registry.contains("manual"));
        assert!(!registry.contains("aws"));
    }

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::with_defaults();
        let err = registry
            .create("aws", &ProviderSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnknownProvider(ref k) if k == "aws"));
    }

    #[test]
    fn test_token_required_except_manual() {
        let registry = ProviderRegistry::with_defaults();
        let settings = ProviderSettings::default();
        assert!(matches!(
            registry.create("hetzner", &settings).err(),
            Some(Error::MissingToken(_))
        ));
        assert_eq!(registry.create("manual", &settings).unwrap().key(), "manual");
        assert_eq!(
            registry
                .create("vultr", &ProviderSettings::with_token("t"))
                .unwrap()
                .display_name(),
            "Vultr"
        );
    }
}
