//! Durable countdown store contract.
//!
//! One record per entity holds the last persisted remaining time. The store
//! is overwritten on every refresh tick and cleared on stop/expiry, so a
//! restarted process can resume each countdown with an accurate value.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Persisted remaining-time snapshot for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownRecord {
    pub entity_id: String,
    pub remaining_ms: u64,
    /// Wall-clock time the snapshot was taken (epoch milliseconds).
    pub saved_at_ms: u64,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl CountdownRecord {
    pub fn new(
        entity_id: impl Into<String>,
        remaining_ms: u64,
        saved_at_ms: u64,
        display_name: Option<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            remaining_ms,
            saved_at_ms,
            display_name,
        }
    }

    /// Remaining time at `now_ms`, counting wall-clock time since the save.
    ///
    /// If the clock moved backwards the stored value is returned unchanged.
    pub fn remaining_at(&self, now_ms: u64) -> u64 {
        match now_ms.checked_sub(self.saved_at_ms) {
            Some(elapsed) => self.remaining_ms.saturating_sub(elapsed),
            None => self.remaining_ms,
        }
    }
}

/// Process-wide durable key/value storage: entityId -> remaining time.
pub trait CountdownStore: Send + Sync {
    fn put(&self, record: &CountdownRecord) -> Result<(), StoreError>;

    fn get(&self, entity_id: &str) -> Result<Option<CountdownRecord>, StoreError>;

    fn delete(&self, entity_id: &str) -> Result<(), StoreError>;

    /// All records, ordered by entity id.
    fn list(&self) -> Result<Vec<CountdownRecord>, StoreError>;
}

/// In-process store. Clones share the same records, which lets a test drop an
/// engine and build a new one over the "surviving" store.
#[derive(Debug, Clone)]
pub struct MemoryCountdownStore {
    records: Arc<Mutex<BTreeMap<String, CountdownRecord>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryCountdownStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCountdownStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Take the store offline; every operation fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, CountdownRecord>>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        self.records.lock().map_err(|_| StoreError::Locked)
    }
}

impl CountdownStore for MemoryCountdownStore {
    fn put(&self, record: &CountdownRecord) -> Result<(), StoreError> {
        self.records()?
            .insert(record.entity_id.clone(), record.clone());
        Ok(())
    }

    fn get(&self, entity_id: &str) -> Result<Option<CountdownRecord>, StoreError> {
        Ok(self.records()?.get(entity_id).cloned())
    }

    fn delete(&self, entity_id: &str) -> Result<(), StoreError> {
        self.records()?.remove(entity_id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<CountdownRecord>, StoreError> {
        Ok(self.records()?.values().cloned().collect())
    }
}
