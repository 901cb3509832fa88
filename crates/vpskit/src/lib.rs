//! # vpskit
//!
//! Blocking adapters for creating and deleting VPS instances.
//!
//! This crate provides:
//! - A [`ProviderAdapter`] trait with implementations for Hetzner,
//!   DigitalOcean, Vultr, Linode and externally managed hosts
//! - Server-type listings normalized to `<plan>_<region>` keys, cheapest first
//! - Idempotent SSH key upload, remembering the last uploaded handle
//! - Creation that waits until the vendor reports the server as running
//!
//! ## Example
//!
//! ```no_run
//! use vpskit::{CreateRequest, ProviderRegistry, ProviderSettings};
//!
//! let registry = ProviderRegistry::with_defaults();
//! let hetzner = registry
//!     .create("hetzner", &ProviderSettings::with_token("token"))
//!     .expect("adapter");
//!
//! for server_type in hetzner.list_server_types().expect("listing") {
//!     println!("{} {}", server_type.key, server_type);
//! }
//!
//! let request = CreateRequest::new("vps-1", "cx22_fsn1");
//! let observed = hetzner.create(None, &request).expect("server");
//! println!("{:?}", hetzner.public_address(&observed));
//! ```
//!
//! ## Testing
//!
//! Every HTTP adapter takes a [`Transport`](transport::Transport); tests use
//! [`MockTransport`](transport::MockTransport):
//!
//! ```
//! use std::sync::Arc;
//! use vpskit::providers::{HetznerAdapter, ProviderAdapter};
//! use vpskit::transport::{Method, MockTransport};
//! use vpskit::PollConfig;
//! use serde_json::json;
//!
//! let mock = MockTransport::new("hetzner")
//!     .on(Method::Delete, "servers/7", serde_json::Value::Null);
//! let adapter = HetznerAdapter::new(Arc::new(mock.clone()), PollConfig::default());
//!
//! adapter.delete(&json!({ "id": 7 })).unwrap();
//! assert_eq!(mock.count(Method::Delete, "servers/7"), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod keys;
pub mod providers;
pub mod registry;
pub mod transport;
pub mod types;

pub use error::{Error, ErrorCategory, Result};
pub use keys::{KeyHandleStore, MemoryKeyStore, sync_key};
pub use providers::{ProviderAdapter, is_present};
pub use registry::ProviderRegistry;
pub use types::{
    CreateRequest, KeyHandle, PollConfig, ProviderSettings, ServerType, price_label,
    server_type_key, sort_server_types, split_server_type_key,
};
