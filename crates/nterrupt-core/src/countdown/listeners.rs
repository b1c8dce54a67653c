use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Entities whose blocking surface wants countdown broadcasts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSet {
    members: BTreeSet<String>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the entity was not already subscribed.
    pub fn subscribe(&mut self, entity_id: &str) -> bool {
        self.members.insert(entity_id.to_string())
    }

    pub fn unsubscribe(&mut self, entity_id: &str) -> bool {
        self.members.remove(entity_id)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.members.contains(entity_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }
}
