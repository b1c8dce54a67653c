//! Blocked entities and derived countdown snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::to_datetime;

/// An active block on one entity.
///
/// `expiry_ms` is fixed when the block starts; remaining time is always
/// derived from it and never decremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedEntity {
    pub entity_id: String,
    pub display_name: String,
    /// Unique per block instance.
    pub block_id: String,
    /// Absolute wall-clock expiry (epoch milliseconds).
    pub expiry_ms: u64,
    /// Original duration requested for this block.
    pub duration_ms: u64,
}

impl BlockedEntity {
    /// Start a new block at `now_ms`.
    pub fn new(
        entity_id: impl Into<String>,
        display_name: impl Into<String>,
        duration_ms: u64,
        now_ms: u64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            display_name: display_name.into(),
            block_id: Uuid::new_v4().to_string(),
            expiry_ms: now_ms.saturating_add(duration_ms),
            duration_ms,
        }
    }

    /// Rebuild a block from a durable snapshot taken before a restart.
    pub fn restored(
        entity_id: impl Into<String>,
        display_name: Option<String>,
        remaining_ms: u64,
        now_ms: u64,
    ) -> Self {
        let entity_id = entity_id.into();
        let display_name = display_name.unwrap_or_else(|| fallback_display_name(&entity_id));
        Self::new(entity_id, display_name, remaining_ms, now_ms)
    }

    /// `max(0, expiry - now)`.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.expiry_ms.saturating_sub(now_ms)
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.remaining_ms(now_ms) == 0
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        to_datetime(self.expiry_ms)
    }

    pub fn snapshot(&self, now_ms: u64) -> CountdownSnapshot {
        CountdownSnapshot {
            entity_id: self.entity_id.clone(),
            display_name: self.display_name.clone(),
            remaining_ms: self.remaining_ms(now_ms),
        }
    }
}

/// Ephemeral remaining-time view of a block, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownSnapshot {
    pub entity_id: String,
    pub display_name: String,
    pub remaining_ms: u64,
}

impl CountdownSnapshot {
    pub fn is_active(&self) -> bool {
        self.remaining_ms > 0
    }
}

/// Name shown when no display name survived: the last `.` segment of the id.
pub fn fallback_display_name(entity_id: &str) -> String {
    entity_id
        .rsplit('.')
        .find(|segment| !segment.is_empty())
        .unwrap_or(entity_id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_start_plus_duration() {
        let block = BlockedEntity::new("com.example.social", "Social", 300_000, 1_000);
        assert_eq!(block.expiry_ms, 301_000);
        assert_eq!(block.remaining_ms(1_000), 300_000);
        assert_eq!(block.remaining_ms(300_000), 1_000);
        assert_eq!(block.remaining_ms(301_000), 0);
        assert_eq!(block.remaining_ms(999_999), 0);
        assert!(block.is_expired(301_000));
    }

    #[test]
    fn block_ids_are_unique_per_instance() {
        let a = BlockedEntity::new("app", "App", 10, 0);
        let b = BlockedEntity::new("app", "App", 10, 0);
        assert_ne!(a.block_id, b.block_id);
    }

    #[test]
    fn restored_block_uses_fallback_name() {
        let block = BlockedEntity::restored("com.example.video", None, 5_000, 100);
        assert_eq!(block.display_name, "video");
        assert_eq!(block.expiry_ms, 5_100);

        let named = BlockedEntity::restored("com.example.video", Some("Video".into()), 5_000, 100);
        assert_eq!(named.display_name, "Video");
    }

    #[test]
    fn fallback_display_name_handles_odd_ids() {
        assert_eq!(fallback_display_name("plain"), "plain");
        assert_eq!(fallback_display_name("com.example."), "example");
        assert_eq!(fallback_display_name("..."), "...");
    }
}
