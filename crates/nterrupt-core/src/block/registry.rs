//! Two-tier registry of blocked entities.
//!
//! The memory tier holds full [`BlockedEntity`] metadata and is lost on
//! process death. The durable tier is a [`CountdownStore`] holding remaining
//! time snapshots keyed by entity id. Reads take the larger of the two
//! remaining times; reconciliation removes anything that reached zero and
//! adopts durable-only records into memory.
//!
//! When the durable tier is ahead of memory (another process replaced the
//! block, or a delete failed), reconciliation moves the memory expiry
//! forward to match it.
//!
//! Removals, adoptions and rebases made by reconciliation are queued rather
//! than dropped, so the owner can act on every one of them.

use std::collections::{BTreeMap, BTreeSet};

use super::entity::BlockedEntity;
use crate::error::StoreError;
use crate::storage::{CountdownRecord, CountdownStore};

pub struct BlockRegistry {
    entries: BTreeMap<String, BlockedEntity>,
    store: Box<dyn CountdownStore>,
    /// Entities removed by reconciliation, awaiting expiry handling.
    expired: Vec<BlockedEntity>,
    /// Entities adopted from the durable tier.
    restored: Vec<BlockedEntity>,
    /// Memory entries whose expiry moved forward to match the durable tier.
    rebased: Vec<BlockedEntity>,
    /// Unregistered entities whose durable delete failed. Never re-adopted.
    tombstones: BTreeSet<String>,
}

impl BlockRegistry {
    pub fn new(store: Box<dyn CountdownStore>) -> Self {
        Self {
            entries: BTreeMap::new(),
            store,
            expired: Vec::new(),
            restored: Vec::new(),
            rebased: Vec::new(),
            tombstones: BTreeSet::new(),
        }
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Register (or replace) a block. The durable tier is written first.
    ///
    /// Returns the block previously registered for the same entity.
    pub fn register(&mut self, entity: BlockedEntity, now_ms: u64) -> Option<BlockedEntity> {
        self.tombstones.remove(&entity.entity_id);
        if let Err(e) = self.persist(&entity, now_ms) {
            tracing::warn!(
                "Failed to persist block for {}: {}; memory tier stays authoritative",
                entity.entity_id,
                e
            );
            // An older, longer snapshot must not shadow the replacement.
            if let Err(e) = self.store.delete(&entity.entity_id) {
                tracing::debug!("Could not clear stale record for {}: {}", entity.entity_id, e);
            }
        }
        self.entries.insert(entity.entity_id.clone(), entity)
    }

    /// Remove a block from both tiers.
    pub fn unregister(&mut self, entity_id: &str) -> Option<BlockedEntity> {
        let removed = self.entries.remove(entity_id);
        self.delete_durable(entity_id);
        removed
    }

    /// Write a fresh remaining-time snapshot for `entity`.
    pub fn persist(&self, entity: &BlockedEntity, now_ms: u64) -> Result<(), StoreError> {
        self.store.put(&CountdownRecord::new(
            entity.entity_id.clone(),
            entity.remaining_ms(now_ms),
            now_ms,
            Some(entity.display_name.clone()),
        ))
    }

    /// Refresh the durable snapshot for `entity_id` with the authoritative
    /// remaining time, so a shorter memory entry never overwrites a longer
    /// durable record.
    pub fn checkpoint(&self, entity_id: &str, now_ms: u64) -> Result<(), StoreError> {
        let Some(entity) = self.entries.get(entity_id) else {
            return Ok(());
        };
        self.store.put(&CountdownRecord::new(
            entity.entity_id.clone(),
            self.remaining_ms(entity_id, now_ms),
            now_ms,
            Some(entity.display_name.clone()),
        ))
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Memory-tier entry, without reconciliation.
    pub fn get(&self, entity_id: &str) -> Option<&BlockedEntity> {
        self.entries.get(entity_id)
    }

    /// Reconcile one entity, then return it if still active.
    pub fn lookup(&mut self, entity_id: &str, now_ms: u64) -> Option<&BlockedEntity> {
        let durable = self.read_durable(entity_id);
        self.reconcile_entry(entity_id, durable, now_ms);
        self.entries.get(entity_id)
    }

    /// Authoritative remaining time: the larger of the two tiers. Pure read.
    pub fn remaining_ms(&self, entity_id: &str, now_ms: u64) -> u64 {
        let memory = self
            .entries
            .get(entity_id)
            .map(|e| e.remaining_ms(now_ms))
            .unwrap_or(0);
        if self.tombstones.contains(entity_id) {
            return memory;
        }
        let durable = self
            .read_durable(entity_id)
            .map(|r| r.remaining_at(now_ms))
            .unwrap_or(0);
        memory.max(durable)
    }

    pub fn entries(&self) -> impl Iterator<Item = &BlockedEntity> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// Cleanup pass over the union of both tiers.
    pub fn reconcile(&mut self, now_ms: u64) {
        let mut durable: BTreeMap<String, CountdownRecord> = match self.store.list() {
            Ok(records) => records
                .into_iter()
                .map(|r| (r.entity_id.clone(), r))
                .collect(),
            Err(e) => {
                tracing::warn!("Durable tier unreadable during reconciliation: {}", e);
                BTreeMap::new()
            }
        };

        let ids: BTreeSet<String> = self
            .entries
            .keys()
            .chain(durable.keys())
            .cloned()
            .collect();
        for id in ids {
            let record = durable.remove(&id);
            self.reconcile_entry(&id, record, now_ms);
        }
    }

    pub fn take_expired(&mut self) -> Vec<BlockedEntity> {
        std::mem::take(&mut self.expired)
    }

    pub fn take_restored(&mut self) -> Vec<BlockedEntity> {
        std::mem::take(&mut self.restored)
    }

    pub fn take_rebased(&mut self) -> Vec<BlockedEntity> {
        std::mem::take(&mut self.rebased)
    }

    fn reconcile_entry(&mut self, entity_id: &str, durable: Option<CountdownRecord>, now_ms: u64) {
        if self.tombstones.contains(entity_id) {
            if durable.is_some() {
                self.delete_durable(entity_id);
            } else {
                self.tombstones.remove(entity_id);
            }
            return;
        }

        let memory_remaining = self.entries.get(entity_id).map(|e| e.remaining_ms(now_ms));
        let durable_remaining = durable.as_ref().map(|r| r.remaining_at(now_ms));
        let authoritative = memory_remaining
            .unwrap_or(0)
            .max(durable_remaining.unwrap_or(0));

        if authoritative == 0 {
            let removed = self.entries.remove(entity_id);
            if durable.is_some() {
                self.delete_durable(entity_id);
            }
            match (removed, durable) {
                (Some(entity), _) => self.expired.push(entity),
                // Expired while no process held it in memory.
                (None, Some(record)) => self.expired.push(BlockedEntity::restored(
                    record.entity_id,
                    record.display_name,
                    0,
                    now_ms,
                )),
                (None, None) => {}
            }
            return;
        }

        match (memory_remaining, durable) {
            (None, Some(record)) => {
                let entity =
                    BlockedEntity::restored(record.entity_id, record.display_name, authoritative, now_ms);
                tracing::info!(
                    "Adopted {} from durable tier with {}ms remaining",
                    entity.entity_id,
                    authoritative
                );
                self.restored.push(entity.clone());
                self.entries.insert(entity.entity_id.clone(), entity);
            }
            (Some(memory), Some(record)) if authoritative > memory => {
                tracing::info!(
                    "Durable tier ahead of memory for {} ({}ms > {}ms); rebasing",
                    entity_id,
                    authoritative,
                    memory
                );
                if let Some(entry) = self.entries.get_mut(entity_id) {
                    entry.expiry_ms = now_ms.saturating_add(authoritative);
                    if let Some(name) = record.display_name {
                        entry.display_name = name;
                    }
                    self.rebased.push(entry.clone());
                }
            }
            _ => {}
        }
    }

    fn read_durable(&self, entity_id: &str) -> Option<CountdownRecord> {
        match self.store.get(entity_id) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!("Durable read failed for {}: {}", entity_id, e);
                None
            }
        }
    }

    fn delete_durable(&mut self, entity_id: &str) {
        match self.store.delete(entity_id) {
            Ok(()) => {
                self.tombstones.remove(entity_id);
            }
            Err(e) => {
                tracing::warn!("Failed to delete durable record for {}: {}", entity_id, e);
                self.tombstones.insert(entity_id.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryCountdownStore;

    fn registry() -> (BlockRegistry, MemoryCountdownStore) {
        let store = MemoryCountdownStore::new();
        (BlockRegistry::new(Box::new(store.clone())), store)
    }

    #[test]
    fn register_writes_both_tiers() {
        let (mut reg, store) = registry();
        let block = BlockedEntity::new("app", "App", 10_000, 0);
        assert!(reg.register(block.clone(), 0).is_none());

        assert_eq!(reg.get("app"), Some(&block));
        let record = store.get("app").unwrap().unwrap();
        assert_eq!(record.remaining_ms, 10_000);
        assert_eq!(record.display_name.as_deref(), Some("App"));
    }

    #[test]
    fn register_replaces_existing_block() {
        let (mut reg, store) = registry();
        let first = BlockedEntity::new("app", "App", 10_000, 0);
        let second = BlockedEntity::new("app", "App", 3_000, 100);
        reg.register(first.clone(), 0);
        assert_eq!(reg.register(second.clone(), 100), Some(first));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.remaining_ms("app", 100), 3_000);
        assert_eq!(store.get("app").unwrap().unwrap().remaining_ms, 3_000);
    }

    #[test]
    fn unregister_clears_both_tiers() {
        let (mut reg, store) = registry();
        reg.register(BlockedEntity::new("app", "App", 10_000, 0), 0);
        assert!(reg.unregister("app").is_some());
        assert!(reg.unregister("app").is_none());
        assert!(store.get("app").unwrap().is_none());
        assert_eq!(reg.remaining_ms("app", 0), 0);
    }

    #[test]
    fn reconcile_queues_expired_entities() {
        let (mut reg, store) = registry();
        reg.register(BlockedEntity::new("short", "Short", 1_000, 0), 0);
        reg.register(BlockedEntity::new("long", "Long", 60_000, 0), 0);

        reg.reconcile(1_000);
        let expired = reg.take_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].entity_id, "short");
        assert!(reg.get("short").is_none());
        assert!(store.get("short").unwrap().is_none());
        assert!(reg.take_expired().is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn lookup_reconciles_before_read() {
        let (mut reg, _store) = registry();
        reg.register(BlockedEntity::new("app", "App", 1_000, 0), 0);
        assert!(reg.lookup("app", 500).is_some());
        assert!(reg.lookup("app", 1_000).is_none());
        assert_eq!(reg.take_expired().len(), 1);
    }

    #[test]
    fn larger_tier_is_authoritative() {
        let (reg, store) = registry();
        store
            .put(&CountdownRecord::new("app", 8_000, 1_000, None))
            .unwrap();
        // Memory tier empty, durable says 8s at t=1s.
        assert_eq!(reg.remaining_ms("app", 3_000), 6_000);
    }

    #[test]
    fn durable_only_records_are_adopted() {
        let (mut reg, store) = registry();
        store
            .put(&CountdownRecord::new("com.example.video", 8_000, 1_000, None))
            .unwrap();

        reg.reconcile(2_000);
        let restored = reg.take_restored();
        assert_eq!(restored.len(), 1);
        let adopted = reg.get("com.example.video").unwrap();
        assert_eq!(adopted.display_name, "video");
        assert_eq!(adopted.expiry_ms, 9_000);
    }

    #[test]
    fn durable_record_expired_while_dead_is_reported() {
        let (mut reg, store) = registry();
        store
            .put(&CountdownRecord::new("app", 1_000, 0, Some("App".into())))
            .unwrap();
        reg.reconcile(5_000);
        let expired = reg.take_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].display_name, "App");
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn store_failure_keeps_memory_tier() {
        let (mut reg, store) = registry();
        store.set_available(false);
        reg.register(BlockedEntity::new("app", "App", 10_000, 0), 0);
        assert_eq!(reg.remaining_ms("app", 4_000), 6_000);

        reg.reconcile(4_000);
        assert!(reg.take_expired().is_empty());
        assert!(reg.get("app").is_some());
    }

    #[test]
    fn durable_tier_ahead_rebases_memory_expiry() {
        let (mut reg, store) = registry();
        reg.register(BlockedEntity::new("app", "App", 10_000, 0), 0);
        // Another writer replaced the block with a longer one.
        store
            .put(&CountdownRecord::new("app", 60_000, 0, Some("App".into())))
            .unwrap();

        let block = reg.lookup("app", 10_000).cloned().unwrap();
        assert_eq!(block.expiry_ms, 60_000);
        assert_eq!(reg.take_rebased(), vec![block]);
        assert!(reg.take_expired().is_empty());

        reg.checkpoint("app", 10_000).unwrap();
        assert_eq!(store.get("app").unwrap().unwrap().remaining_ms, 50_000);
        assert_eq!(reg.remaining_ms("app", 10_000), 50_000);
    }

    #[test]
    fn checkpoint_never_shortens_durable_record() {
        let (mut reg, store) = registry();
        reg.register(BlockedEntity::new("app", "App", 10_000, 0), 0);
        store
            .put(&CountdownRecord::new("app", 60_000, 0, None))
            .unwrap();

        reg.checkpoint("app", 5_000).unwrap();
        assert_eq!(store.get("app").unwrap().unwrap().remaining_ms, 55_000);
        reg.checkpoint("unknown", 5_000).unwrap();
        assert!(store.get("unknown").unwrap().is_none());
    }

    #[test]
    fn failed_delete_is_not_resurrected() {
        let (mut reg, store) = registry();
        reg.register(BlockedEntity::new("app", "App", 10_000, 0), 0);
        store.set_available(false);
        reg.unregister("app");
        store.set_available(true);

        // Stale durable record still exists but must not come back.
        assert_eq!(reg.remaining_ms("app", 1_000), 0);
        reg.reconcile(1_000);
        assert!(reg.get("app").is_none());
        assert!(reg.take_restored().is_empty());
        assert!(store.get("app").unwrap().is_none());
    }
}
