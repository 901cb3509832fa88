//! Record store: what devbox last submitted and what the providers returned.
//!
//! The store doubles as the previous snapshot for reconciliation and as the
//! provider key-handle cache. `FileStore` keeps everything in one JSON file
//! under the state directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::ResourceDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use vpskit::{KeyHandle, KeyHandleStore};

use crate::paths;

/// Record file name inside the state directory
pub const RECORDS_FILE: &str = "records.json";

const FORMAT_VERSION: u32 = 1;

/// Persistent resource records.
///
/// `put`/`set`/`remove` change the in-memory view; `save` writes it out.
pub trait RecordStore: KeyHandleStore {
    /// Every record, in insertion order
    fn records(&self) -> Vec<ResourceDescriptor>;

    fn get(&self, id: &str) -> Option<ResourceDescriptor>;

    /// Insert or replace a record
    fn put(&self, resource: ResourceDescriptor);

    /// Set one field of a record.
    ///
    /// `observed_state`, `pending_state` and `parent_id` address the
    /// descriptor fields (JSON `null` clears them); any other name is a
    /// desired-config entry.
    fn set(&self, id: &str, field: &str, value: Value) -> Result<()>;

    /// Drop a record; `false` when it was not there
    fn remove(&self, id: &str) -> bool;

    fn save(&self) -> Result<()>;
}

// ============================================================================
// On-disk format
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    #[serde(flatten)]
    descriptor: ResourceDescriptor,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordFile {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    records: Vec<StoredRecord>,
    #[serde(default)]
    key_handles: BTreeMap<String, KeyHandle>,
}

impl Default for RecordFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            updated_at: Utc::now(),
            records: Vec::new(),
            key_handles: BTreeMap::new(),
        }
    }
}

impl RecordFile {
    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.descriptor.id == id)
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// JSON-file record store, safe to share between worker threads
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: Mutex<RecordFile>,
}

impl FileStore {
    /// Open `<state dir>/records.json`
    pub fn open_default() -> Result<Self> {
        Self::open(paths::state_dir()?.join(RECORDS_FILE))
    }

    /// Open a record file; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read record file: {}", path.display()))?;
            let data: RecordFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse record file: {}", path.display()))?;
            log::debug!(
                "Loaded {} records from {}",
                data.records.len(),
                path.display()
            );
            data
        } else {
            log::debug!("No record file at {}, starting empty", path.display());
            RecordFile::default()
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the file was last written
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.lock().updated_at
    }

    fn lock(&self) -> MutexGuard<'_, RecordFile> {
        // A panic in another worker must not lose the records
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self, data: &mut RecordFile) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        data.updated_at = Utc::now();
        let content =
            serde_json::to_string_pretty(&*data).context("Failed to serialize records")?;

        // Write then rename so a crash never leaves a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write record file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace record file: {}", self.path.display()))?;

        log::debug!("Saved {} records to {}", data.records.len(), self.path.display());
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn records(&self) -> Vec<ResourceDescriptor> {
        self.lock()
            .records
            .iter()
            .map(|r| r.descriptor.clone())
            .collect()
    }

    fn get(&self, id: &str) -> Option<ResourceDescriptor> {
        let data = self.lock();
        data.position(id).map(|i| data.records[i].descriptor.clone())
    }

    fn put(&self, resource: ResourceDescriptor) {
        let mut data = self.lock();
        let record = StoredRecord {
            descriptor: resource,
            updated_at: Utc::now(),
        };
        match data.position(&record.descriptor.id) {
            Some(i) => data.records[i] = record,
            None => data.records.push(record),
        }
    }

    fn set(&self, id: &str, field: &str, value: Value) -> Result<()> {
        let mut data = self.lock();
        let index = data
            .position(id)
            .with_context(|| format!("No record for {id}"))?;
        let record = &mut data.records[index];

        match field {
            "observed_state" => {
                record.descriptor.observed_state = (!value.is_null()).then_some(value);
            }
            "parent_id" => {
                record.descriptor.parent_id = value.as_str().map(str::to_string);
            }
            "pending_state" => {
                record.descriptor.pending_state = (!value.is_null()).then_some(value);
            }
            _ => {
                record.descriptor.desired_config.insert(field.to_string(), value);
            }
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    fn remove(&self, id: &str) -> bool {
        let mut data = self.lock();
        match data.position(id) {
            Some(i) => {
                data.records.remove(i);
                true
            }
            None => false,
        }
    }

    fn save(&self) -> Result<()> {
        let mut data = self.lock();
        self.write(&mut data)
    }
}

impl KeyHandleStore for FileStore {
    fn key_handle(&self, provider: &str) -> Option<KeyHandle> {
        self.lock().key_handles.get(provider).cloned()
    }

    fn store_key_handle(&self, provider: &str, handle: &KeyHandle) -> vpskit::Result<()> {
        let mut data = self.lock();
        data.key_handles.insert(provider.to_string(), handle.clone());
        self.write(&mut data)
            .map_err(|e| vpskit::Error::Store(format!("{e:#}")))
    }
}
