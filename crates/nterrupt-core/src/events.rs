use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::CountdownSnapshot;
use crate::countdown::EngineState;

/// Every state change in the system produces an Event.
///
/// Events are at-least-once notifications: durable state is always written
/// before the event that describes it is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    BlockStarted {
        entity_id: String,
        display_name: String,
        block_id: String,
        duration_ms: u64,
        expires_at: DateTime<Utc>,
        /// An active block for the same entity was replaced.
        replaced: bool,
        at: DateTime<Utc>,
    },
    /// Block reconstructed from the durable store.
    BlockRestored {
        entity_id: String,
        display_name: String,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    BlockStopped {
        entity_id: String,
        block_id: String,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    CountdownUpdate {
        entity_id: String,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    BlockExpired {
        entity_id: String,
        at: DateTime<Utc>,
    },
    SurfaceShown {
        entity_id: String,
        display_name: String,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// Existing surface brought back to the foreground.
    SurfaceReasserted {
        entity_id: String,
        at: DateTime<Utc>,
    },
    SurfaceDismissed {
        entity_id: String,
        at: DateTime<Utc>,
    },
    MonitorArmed {
        at: DateTime<Utc>,
    },
    MonitorHalted {
        at: DateTime<Utc>,
    },
    StateSnapshot {
        state: EngineState,
        blocks: Vec<CountdownSnapshot>,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// The entity this event concerns, if any.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Event::BlockStarted { entity_id, .. }
            | Event::BlockRestored { entity_id, .. }
            | Event::BlockStopped { entity_id, .. }
            | Event::CountdownUpdate { entity_id, .. }
            | Event::BlockExpired { entity_id, .. }
            | Event::SurfaceShown { entity_id, .. }
            | Event::SurfaceReasserted { entity_id, .. }
            | Event::SurfaceDismissed { entity_id, .. } => Some(entity_id),
            Event::MonitorArmed { .. }
            | Event::MonitorHalted { .. }
            | Event::StateSnapshot { .. } => None,
        }
    }
}
