//! Core types for provider operations.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// One orderable server shape: a plan offered in a specific region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerType {
    /// Selection key, `<plan>_<region>`.
    pub key: String,
    /// Vendor plan identifier.
    pub plan: String,
    /// Vendor region identifier.
    pub region: String,
    /// Human-readable location.
    pub location: String,
    /// Monthly price in `currency`.
    pub monthly_price: f64,
    /// Hourly price in `currency`.
    pub hourly_price: f64,
    /// ISO currency code.
    pub currency: String,
    /// Display-only price string.
    pub price_label: String,
    /// Human-readable hardware summary.
    pub specs: String,
}

impl ServerType {
    /// Build an entry, deriving the key and price label.
    pub fn new(
        plan: impl Into<String>,
        region: impl Into<String>,
        location: impl Into<String>,
        (monthly_price, hourly_price): (f64, f64),
        currency: impl Into<String>,
        specs: impl Into<String>,
    ) -> Self {
        let plan = plan.into();
        let region = region.into();
        let currency = currency.into();
        Self {
            key: server_type_key(&plan, &region),
            price_label: price_label(monthly_price, hourly_price, &currency),
            plan,
            region,
            location: location.into(),
            monthly_price,
            hourly_price,
            currency,
            specs: specs.into(),
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {}",
            self.price_label, self.location, self.plan, self.specs
        )
    }
}

/// Build a `<plan>_<region>` selection key.
pub fn server_type_key(plan: &str, region: &str) -> String {
    format!("{plan}_{region}")
}

/// Split a selection key into plan and region.
///
/// Splits at the first underscore; vendor plan ids never contain one.
pub fn split_server_type_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('_')
        .filter(|(plan, region)| !plan.is_empty() && !region.is_empty())
        .ok_or_else(|| Error::InvalidResponse(format!("server type `{key}` is not <plan>_<region>")))
}

/// Format a price pair for display.
pub fn price_label(monthly: f64, hourly: f64, currency: &str) -> String {
    format!("{monthly:.4} {currency}/mo ({hourly:.5} {currency}/hr)")
}

/// Sort by monthly price, then hourly price, then key.
pub fn sort_server_types(types: &mut [ServerType]) {
    types.sort_by(|a, b| {
        a.monthly_price
            .total_cmp(&b.monthly_price)
            .then_with(|| a.hourly_price.total_cmp(&b.hourly_price))
            .then_with(|| a.key.cmp(&b.key))
    });
}

/// Provider-assigned handle for an uploaded public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHandle {
    /// Provider key id.
    pub id: String,
    /// Name the key was uploaded under.
    pub name: String,
    /// Public key as uploaded.
    pub public_key: String,
}

impl KeyHandle {
    /// Whether this handle was uploaded with `public_key`.
    pub fn matches(&self, public_key: &str) -> bool {
        self.public_key.trim() == public_key.trim()
    }
}

/// Parameters for creating a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Server name / label.
    pub name: String,
    /// `<plan>_<region>` selection key.
    pub server_type: String,
    /// Operator public key (OpenSSH format).
    pub public_key: String,
    /// Handle of the key uploaded to this provider, if any.
    pub key: Option<KeyHandle>,
    /// Address of an externally managed host.
    pub address: Option<String>,
}

impl CreateRequest {
    /// Create a request for a provider-managed server.
    pub fn new(name: impl Into<String>, server_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_type: server_type.into(),
            ..Default::default()
        }
    }

    /// Attach the operator key.
    pub fn with_key(mut self, public_key: impl Into<String>, handle: Option<KeyHandle>) -> Self {
        self.public_key = public_key.into();
        self.key = handle;
        self
    }

    /// Set the address of an externally managed host.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Plan and region from the selection key.
    pub fn plan_and_region(&self) -> Result<(&str, &str)> {
        split_server_type_key(&self.server_type)
    }
}

/// How to wait for a new server to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Settings used to construct an adapter.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// API token.
    pub token: Option<String>,
    /// Override of the vendor API base URL.
    pub api_base: Option<String>,
    /// Status polling.
    pub poll: PollConfig,
}

impl ProviderSettings {
    /// Settings with a token and default polling.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// The token, or [`Error::MissingToken`].
    pub fn require_token(&self, provider: &str) -> Result<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::MissingToken(provider.to_string()))
    }
}

/// Compare version-suffixed names (`debian9` < `debian12`), falling back to
/// plain string order.
pub(crate) fn version_order(a: &str, b: &str) -> Ordering {
    fn trailing_number(s: &str) -> Option<u64> {
        let digits: String = s
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    }

    match (trailing_number(a), trailing_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}
