use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::scheduler::ScheduleHandle;

/// Storage key holding the serialized registry
pub const REGISTRY_KEY: &str = "scheduled_notifications";

/// Reminder id to pending trigger handle.
///
/// Serializes as a flat JSON object, `{ "<reminder id>": "<handle>" }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleRegistry {
    entries: BTreeMap<String, ScheduleHandle>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored registry.
    ///
    /// # Errors
    /// Returns the parse error for anything that is not a string-to-string object.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// # Errors
    /// Serialization of a string map does not fail in practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn get(&self, reminder_id: &str) -> Option<&ScheduleHandle> {
        self.entries.get(reminder_id)
    }

    /// Insert or replace; returns the handle that was replaced.
    pub fn insert(&mut self, reminder_id: impl Into<String>, handle: ScheduleHandle) -> Option<ScheduleHandle> {
        self.entries.insert(reminder_id.into(), handle)
    }

    pub fn remove(&mut self, reminder_id: &str) -> Option<ScheduleHandle> {
        self.entries.remove(reminder_id)
    }

    /// Remove the entry only if it still points at `handle`.
    pub fn remove_if(&mut self, reminder_id: &str, handle: &ScheduleHandle) -> bool {
        if self.entries.get(reminder_id) == Some(handle) {
            self.entries.remove(reminder_id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, reminder_id: &str) -> bool {
        self.entries.contains_key(reminder_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScheduleHandle)> {
        self.entries.iter().map(|(id, handle)| (id.as_str(), handle))
    }

    /// Add entries from `other` that this registry does not have yet.
    pub fn absorb_missing(&mut self, other: ScheduleRegistry) {
        for (id, handle) in other.entries {
            self.entries.entry(id).or_insert(handle);
        }
    }
}
