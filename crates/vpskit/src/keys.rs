//! Uploaded key bookkeeping.

use crate::error::Result;
use crate::providers::ProviderAdapter;
use crate::types::KeyHandle;
use std::collections::HashMap;
use std::sync::Mutex;

/// Remembers the key handle last uploaded to each provider.
pub trait KeyHandleStore: Send + Sync {
    /// Handle last uploaded to `provider`.
    fn key_handle(&self, provider: &str) -> Option<KeyHandle>;

    /// Persist the handle for `provider`.
    fn store_key_handle(&self, provider: &str, handle: &KeyHandle) -> Result<()>;
}

/// In-memory store, for tests and one-off commands.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    handles: Mutex<HashMap<String, KeyHandle>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyHandleStore for MemoryKeyStore {
    fn key_handle(&self, provider: &str) -> Option<KeyHandle> {
        self.handles.lock().ok()?.get(provider).cloned()
    }

    fn store_key_handle(&self, provider: &str, handle: &KeyHandle) -> Result<()> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|e| crate::Error::Store(e.to_string()))?;
        handles.insert(provider.to_string(), handle.clone());
        Ok(())
    }
}

/// Make sure `public_key` is the key uploaded to `adapter`'s provider.
///
/// Unchanged key: no request. Changed key: the previous handle is deleted
/// (a vendor "not found" is ignored), the new key uploaded and its handle
/// stored.
pub fn sync_key<A: ProviderAdapter + ?Sized>(
    adapter: &A,
    store: &dyn KeyHandleStore,
    key_name: &str,
    public_key: &str,
) -> Result<KeyHandle> {
    let provider = adapter.key();

    if let Some(existing) = store.key_handle(provider) {
        if existing.matches(public_key) {
            log::info!("SSH key already uploaded to {}", provider);
            return Ok(existing);
        }

        log::info!("Replacing SSH key {} on {}", existing.id, provider);
        match adapter.delete_key(&existing) {
            Ok(()) => {}
            Err(e) if e.is_ignorable() => {
                log::warn!("Previous key {} already gone: {}", existing.id, e);
            }
            Err(e) => return Err(e),
        }
    }

    let handle = adapter.create_key(key_name, public_key)?;
    store.store_key_handle(provider, &handle)?;
    log::info!("Uploaded SSH key {} to {}", handle.id, provider);
    Ok(handle)
}
