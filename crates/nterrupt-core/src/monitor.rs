//! Foreground presence monitor.
//!
//! Polls the host for the entity holding user focus while any block is
//! active. A focused, blocked entity gets its blocking surface shown (or
//! brought back to front). The monitor halts itself once nothing is blocked
//! and is re-armed by the next start.

use crate::clock::to_datetime;
use crate::countdown::CountdownEngine;
use crate::events::Event;
use crate::host::ForegroundProbe;
use crate::storage::MonitorConfig;
use crate::surface::SurfaceManager;

pub struct PresenceMonitor {
    probe: Box<dyn ForegroundProbe>,
    poll_interval_ms: u64,
    armed: bool,
}

impl PresenceMonitor {
    pub fn new(probe: Box<dyn ForegroundProbe>, config: &MonitorConfig) -> Self {
        Self {
            probe,
            poll_interval_ms: config.poll_interval_ms.max(1),
            armed: false,
        }
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Arm polling. Returns `MonitorArmed` only if it was not armed yet.
    pub fn arm(&mut self, now_ms: u64) -> Option<Event> {
        if self.armed {
            return None;
        }
        self.armed = true;
        tracing::debug!("Presence monitor armed every {}ms", self.poll_interval_ms);
        Some(Event::MonitorArmed {
            at: to_datetime(now_ms),
        })
    }

    pub fn halt(&mut self, now_ms: u64) -> Option<Event> {
        if !self.armed {
            return None;
        }
        self.armed = false;
        tracing::info!("Presence monitor halted; no active blocks");
        Some(Event::MonitorHalted {
            at: to_datetime(now_ms),
        })
    }

    /// One poll cycle: reconcile, halt if nothing is blocked, otherwise run
    /// a presence check.
    pub fn poll(&mut self, engine: &mut CountdownEngine, surfaces: &mut SurfaceManager) -> Vec<Event> {
        if !self.armed {
            return Vec::new();
        }
        let mut events = surfaces.apply(engine.cleanup());
        if engine.active_count() == 0 {
            events.extend(self.halt(engine.now_ms()));
            return events;
        }
        events.extend(self.check_now(engine, surfaces));
        events
    }

    /// Presence check without waiting for the next poll.
    pub fn check_now(
        &mut self,
        engine: &mut CountdownEngine,
        surfaces: &mut SurfaceManager,
    ) -> Vec<Event> {
        let Some(foreground) = self.probe.current_foreground_entity() else {
            return Vec::new();
        };
        if !engine.is_active(&foreground) {
            return Vec::new();
        }
        let Some(block) = engine.block(&foreground).cloned() else {
            return Vec::new();
        };
        match surfaces.show(engine, &block) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(
                    "Failed to show blocking surface for {}: {}; retrying next poll",
                    foreground,
                    e
                );
                Vec::new()
            }
        }
    }
}
