//! Countdown engine implementation.
//!
//! The engine owns the authoritative expiry timestamp of every block and
//! recomputes remaining time from the wall clock on every read. It does not
//! use internal threads. The host fires one-shot wake-ups and periodic
//! refresh ticks, and the caller forwards them to `on_wake()` and `tick()`.
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start/recover--> Running --(last block stopped or expired)--> Idle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = CountdownEngine::new(store, scheduler, clock, &config);
//! engine.start("com.example.social", "Social", 300_000)?;
//! // On every refresh tick:
//! for event in engine.tick() { /* broadcast */ }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::listeners::ListenerSet;
use crate::block::{fallback_display_name, BlockRegistry, BlockedEntity, CountdownSnapshot};
use crate::clock::{to_datetime, Clock};
use crate::error::ValidationError;
use crate::events::Event;
use crate::host::WakeScheduler;
use crate::storage::{CountdownStore, EngineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    /// No active blocks; periodic refresh is not armed.
    Idle,
    /// At least one block is active and the periodic refresh is armed.
    Running,
}

/// Core countdown engine.
pub struct CountdownEngine {
    registry: BlockRegistry,
    listeners: ListenerSet,
    scheduler: Box<dyn WakeScheduler>,
    clock: Arc<dyn Clock>,
    refresh_interval_ms: u64,
    state: EngineState,
}

impl CountdownEngine {
    pub fn new(
        store: Box<dyn CountdownStore>,
        scheduler: Box<dyn WakeScheduler>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry: BlockRegistry::new(store),
            listeners: ListenerSet::new(),
            scheduler,
            clock,
            refresh_interval_ms: config.refresh_interval_ms.max(1),
            state: EngineState::Idle,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_ms
    }

    /// Remaining time in milliseconds; 0 when absent or expired.
    pub fn remaining_time(&self, entity_id: &str) -> u64 {
        self.registry.remaining_ms(entity_id, self.now_ms())
    }

    pub fn is_active(&self, entity_id: &str) -> bool {
        self.remaining_time(entity_id) > 0
    }

    pub fn block(&self, entity_id: &str) -> Option<&BlockedEntity> {
        self.registry.get(entity_id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BlockedEntity> {
        self.registry.entries()
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn listeners(&self) -> &ListenerSet {
        &self.listeners
    }

    pub fn countdowns(&self) -> Vec<CountdownSnapshot> {
        let now = self.now_ms();
        self.registry
            .entries()
            .map(|block| CountdownSnapshot {
                remaining_ms: self.registry.remaining_ms(&block.entity_id, now),
                ..block.snapshot(now)
            })
            .collect()
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            state: self.state,
            blocks: self.countdowns(),
            at: to_datetime(self.now_ms()),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start (or replace) a block on `entity_id` for `duration_ms`.
    ///
    /// # Errors
    /// Rejects an empty entity id or a zero duration without touching state.
    pub fn start(
        &mut self,
        entity_id: &str,
        display_name: &str,
        duration_ms: u64,
    ) -> Result<Vec<Event>, ValidationError> {
        if entity_id.trim().is_empty() {
            return Err(ValidationError::EmptyEntityId);
        }
        if duration_ms == 0 {
            return Err(ValidationError::NonPositiveDuration { duration_ms });
        }

        let now = self.now_ms();
        // Settle an already-expired previous block before replacing it.
        let replaced = self.registry.lookup(entity_id, now).is_some();
        let mut events = self.drain_registry(now);

        if replaced {
            self.scheduler.cancel_one_shot(entity_id);
        }

        let display_name = if display_name.trim().is_empty() {
            fallback_display_name(entity_id)
        } else {
            display_name.to_string()
        };
        let block = BlockedEntity::new(entity_id, display_name, duration_ms, now);
        self.registry.register(block.clone(), now);
        self.arm_one_shot(&block);
        self.ensure_running();

        tracing::info!(
            "Started block {} on {} for {}ms (replaced: {})",
            block.block_id,
            entity_id,
            duration_ms,
            replaced
        );

        events.push(Event::BlockStarted {
            entity_id: block.entity_id.clone(),
            display_name: block.display_name.clone(),
            block_id: block.block_id.clone(),
            duration_ms,
            expires_at: block.expires_at(),
            replaced,
            at: to_datetime(now),
        });
        if self.listeners.contains(entity_id) {
            events.push(Event::CountdownUpdate {
                entity_id: block.entity_id,
                remaining_ms: duration_ms,
                at: to_datetime(now),
            });
        }
        Ok(events)
    }

    /// Stop a block. Stopping an unknown entity is a no-op.
    pub fn stop(&mut self, entity_id: &str) -> Vec<Event> {
        let now = self.now_ms();
        self.scheduler.cancel_one_shot(entity_id);
        self.listeners.unsubscribe(entity_id);

        let mut events = Vec::new();
        if let Some(block) = self.registry.unregister(entity_id) {
            tracing::info!("Stopped block {} on {}", block.block_id, entity_id);
            events.push(Event::BlockStopped {
                entity_id: block.entity_id.clone(),
                remaining_ms: block.remaining_ms(now),
                block_id: block.block_id,
                at: to_datetime(now),
            });
        }
        self.halt_if_idle();
        events
    }

    /// Periodic refresh: persist fresh remaining times, broadcast to
    /// listeners, and expire anything that reached zero.
    pub fn tick(&mut self) -> Vec<Event> {
        let now = self.now_ms();
        self.registry.reconcile(now);
        let mut events = self.drain_registry(now);

        for block in self.registry.entries() {
            if let Err(e) = self.registry.checkpoint(&block.entity_id, now) {
                tracing::warn!("Failed to persist countdown for {}: {}", block.entity_id, e);
            }
            if self.listeners.contains(&block.entity_id) {
                events.push(Event::CountdownUpdate {
                    entity_id: block.entity_id.clone(),
                    remaining_ms: self.registry.remaining_ms(&block.entity_id, now),
                    at: to_datetime(now),
                });
            }
        }

        self.halt_if_idle();
        events
    }

    /// Handle the one-shot wake-up for `entity_id`.
    ///
    /// Early or stale wake-ups (the block is still active, possibly because
    /// it was replaced) re-arm the wake-up at the stored expiry instead of
    /// expiring anything.
    pub fn on_wake(&mut self, entity_id: &str) -> Vec<Event> {
        let now = self.now_ms();
        if let Some(block) = self.registry.lookup(entity_id, now).cloned() {
            tracing::debug!(
                "Wake-up for {} with {}ms still remaining; re-arming",
                entity_id,
                block.remaining_ms(now)
            );
            self.arm_one_shot(&block);
        }
        let events = self.drain_registry(now);
        self.halt_if_idle();
        events
    }

    /// Expiry handling. Idempotent: a second call for a removed entity is a no-op.
    pub fn expire(&mut self, entity_id: &str) -> Vec<Event> {
        let now = self.now_ms();
        let events = match self.registry.unregister(entity_id) {
            Some(block) => vec![self.finish_expired(block, now)],
            None => Vec::new(),
        };
        self.halt_if_idle();
        events
    }

    /// Add `entity_id` to the listener set; emits the current countdown
    /// immediately if the block is active.
    pub fn subscribe(&mut self, entity_id: &str) -> Vec<Event> {
        self.listeners.subscribe(entity_id);
        let remaining_ms = self.remaining_time(entity_id);
        if remaining_ms == 0 {
            return Vec::new();
        }
        vec![Event::CountdownUpdate {
            entity_id: entity_id.to_string(),
            remaining_ms,
            at: to_datetime(self.now_ms()),
        }]
    }

    pub fn unsubscribe(&mut self, entity_id: &str) -> bool {
        self.listeners.unsubscribe(entity_id)
    }

    /// Reconciliation pass without persisting fresh snapshots.
    pub fn cleanup(&mut self) -> Vec<Event> {
        let now = self.now_ms();
        self.registry.reconcile(now);
        let events = self.drain_registry(now);
        self.halt_if_idle();
        events
    }

    /// Restart path: rebuild the memory tier from the durable store.
    pub fn recover(&mut self) -> Vec<Event> {
        let events = self.cleanup();
        tracing::info!(
            "Recovered {} active block(s) from durable store",
            self.registry.len()
        );
        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Turn queued registry adoptions and removals into events, and move
    /// wake-ups for rebased blocks.
    fn drain_registry(&mut self, now: u64) -> Vec<Event> {
        let mut events = Vec::new();
        for block in self.registry.take_restored() {
            self.arm_one_shot(&block);
            self.ensure_running();
            events.push(Event::BlockRestored {
                remaining_ms: block.remaining_ms(now),
                entity_id: block.entity_id,
                display_name: block.display_name,
                at: to_datetime(now),
            });
        }
        for block in self.registry.take_rebased() {
            self.arm_one_shot(&block);
        }
        for block in self.registry.take_expired() {
            events.push(self.finish_expired(block, now));
        }
        events
    }

    fn finish_expired(&mut self, block: BlockedEntity, now: u64) -> Event {
        self.scheduler.cancel_one_shot(&block.entity_id);
        self.listeners.unsubscribe(&block.entity_id);
        tracing::info!("Block {} on {} expired", block.block_id, block.entity_id);
        Event::BlockExpired {
            entity_id: block.entity_id,
            at: to_datetime(now),
        }
    }

    fn arm_one_shot(&mut self, block: &BlockedEntity) {
        if let Err(e) = self
            .scheduler
            .schedule_one_shot(&block.entity_id, block.expiry_ms)
        {
            tracing::warn!(
                "Wake-up for {} not scheduled ({}); refresh tick will detect expiry",
                block.entity_id,
                e
            );
        }
    }

    fn ensure_running(&mut self) {
        if self.state == EngineState::Running {
            return;
        }
        if let Err(e) = self.scheduler.schedule_repeating(self.refresh_interval_ms) {
            tracing::warn!("Periodic refresh not scheduled: {}", e);
        }
        self.state = EngineState::Running;
        tracing::debug!("Countdown refresh armed every {}ms", self.refresh_interval_ms);
    }

    fn halt_if_idle(&mut self) {
        if self.state == EngineState::Running && self.registry.is_empty() {
            self.scheduler.cancel_repeating();
            self.state = EngineState::Idle;
            tracing::info!("No active blocks; countdown refresh halted");
        }
    }
}
