//! Per-entity alert cool-down.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Last alert sent for one entity, plus whatever context was worth keeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub last_alert: NaiveDateTime,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

/// Entity id → last alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CooldownCache {
    entries: BTreeMap<String, CooldownEntry>,
}

impl CooldownCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when an alert for `key` went out less than `window` before `now`.
    pub fn is_suppressed(&self, key: &str, now: NaiveDateTime, window: Duration) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| now - entry.last_alert < window)
    }

    pub fn record(&mut self, key: &str, now: NaiveDateTime, context: BTreeMap<String, String>) {
        self.entries.insert(
            key.to_string(),
            CooldownEntry {
                last_alert: now,
                context,
            },
        );
    }

    pub fn clear(&mut self, key: &str) -> Option<CooldownEntry> {
        self.entries.remove(key)
    }

    /// Drop every entry whose key is not in `live`. Returns how many went.
    pub fn retain_live(&mut self, live: &HashSet<String>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| live.contains(key));
        before - self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&CooldownEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
