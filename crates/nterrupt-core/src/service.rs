//! Control surface over the engine, surfaces and presence monitor.
//!
//! `BlockService` is the single owner of all blocking state. Hosts drive it
//! either directly (tests, one-shot CLI commands) or through the actor in
//! [`crate::runtime`]. Every returned event has already been applied to the
//! blocking surfaces.

use crate::countdown::CountdownEngine;
use crate::error::ValidationError;
use crate::events::Event;
use crate::monitor::PresenceMonitor;
use crate::surface::{Gesture, SurfaceManager};

pub struct BlockService {
    engine: CountdownEngine,
    surfaces: SurfaceManager,
    monitor: PresenceMonitor,
}

impl BlockService {
    pub fn new(engine: CountdownEngine, surfaces: SurfaceManager, monitor: PresenceMonitor) -> Self {
        Self {
            engine,
            surfaces,
            monitor,
        }
    }

    pub fn engine(&self) -> &CountdownEngine {
        &self.engine
    }

    pub fn surfaces(&self) -> &SurfaceManager {
        &self.surfaces
    }

    pub fn monitor(&self) -> &PresenceMonitor {
        &self.monitor
    }

    /// Start (or replace) a block and run an immediate presence check.
    pub fn start_block(
        &mut self,
        entity_id: &str,
        display_name: &str,
        duration_ms: u64,
    ) -> Result<Vec<Event>, ValidationError> {
        let started = self.engine.start(entity_id, display_name, duration_ms)?;
        let mut events = self.surfaces.apply(started);
        events.extend(self.monitor.arm(self.engine.now_ms()));
        events.extend(self.monitor.check_now(&mut self.engine, &mut self.surfaces));
        Ok(events)
    }

    pub fn stop_block(&mut self, entity_id: &str) -> Vec<Event> {
        let stopped = self.engine.stop(entity_id);
        self.settle(stopped)
    }

    pub fn query_remaining(&self, entity_id: &str) -> u64 {
        self.engine.remaining_time(entity_id)
    }

    pub fn query_active(&self, entity_id: &str) -> bool {
        self.engine.is_active(entity_id)
    }

    /// Periodic refresh tick.
    pub fn refresh(&mut self) -> Vec<Event> {
        let ticked = self.engine.tick();
        self.settle(ticked)
    }

    /// One-shot wake-up for `entity_id`.
    pub fn wake(&mut self, entity_id: &str) -> Vec<Event> {
        let woken = self.engine.on_wake(entity_id);
        self.settle(woken)
    }

    pub fn poll_presence(&mut self) -> Vec<Event> {
        self.monitor.poll(&mut self.engine, &mut self.surfaces)
    }

    pub fn gesture(&mut self, entity_id: &str, gesture: Gesture) -> Vec<Event> {
        self.surfaces.gesture(entity_id, gesture, self.engine.now_ms())
    }

    /// The host destroyed a surface. Returns `true` if its block is still
    /// active and the surface should be recreated.
    pub fn surface_torn_down(&mut self, entity_id: &str) -> bool {
        self.surfaces.teardown(&mut self.engine, entity_id)
    }

    pub fn recreate_surface(&mut self, entity_id: &str) -> Vec<Event> {
        match self.surfaces.recreate_if_needed(&mut self.engine, entity_id) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("Failed to recreate blocking surface for {}: {}", entity_id, e);
                Vec::new()
            }
        }
    }

    /// Restart path: rebuild blocks from the durable store.
    pub fn recover(&mut self) -> Vec<Event> {
        let recovered = self.engine.recover();
        self.adopt(recovered)
    }

    /// Reconciliation pass while the presence monitor is idle. Picks up
    /// blocks another process wrote to the durable store.
    pub fn reconcile(&mut self) -> Vec<Event> {
        let reconciled = self.engine.cleanup();
        self.adopt(reconciled)
    }

    /// Dismiss every surface; blocks stay in the durable store.
    pub fn shutdown(&mut self) -> Vec<Event> {
        let now = self.engine.now_ms();
        let mut events = self.surfaces.dismiss_all(now);
        events.extend(self.monitor.halt(now));
        events
    }

    pub fn snapshot(&self) -> Event {
        self.engine.snapshot()
    }

    /// Ongoing notification text.
    pub fn status_line(&self) -> String {
        let names: Vec<&str> = self
            .engine
            .blocks()
            .map(|block| block.display_name.as_str())
            .collect();
        if names.is_empty() {
            "Monitoring app usage and enforcing limits".to_string()
        } else {
            format!("Blocking {} app(s): {}", names.len(), names.join(", "))
        }
    }

    fn adopt(&mut self, events: Vec<Event>) -> Vec<Event> {
        let mut events = self.surfaces.apply(events);
        if self.engine.active_count() > 0 {
            events.extend(self.monitor.arm(self.engine.now_ms()));
            events.extend(self.monitor.check_now(&mut self.engine, &mut self.surfaces));
        }
        events
    }

    fn settle(&mut self, events: Vec<Event>) -> Vec<Event> {
        let mut events = self.surfaces.apply(events);
        if self.engine.active_count() == 0 {
            events.extend(self.monitor.halt(self.engine.now_ms()));
        }
        events
    }
}
