//! Armed-timer bookkeeping.
//!
//! The registry is the single source of truth for "is this logical timer
//! armed". Every arm stamps the entry with a fresh generation; a fire that
//! arrives carrying an older generation belongs to a pending fire that was
//! since replaced or cancelled, and must be ignored.

use super::timer::TimerSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// One armed timer as recorded by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedTimer {
    /// Timer definition.
    pub spec: TimerSpec,
    /// Next planned fire (UTC).
    pub fire_at: DateTime<Utc>,
    /// When the timer was last armed.
    pub armed_at: DateTime<Utc>,
    /// Arm generation; not persisted.
    #[serde(skip)]
    pub generation: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, ArmedTimer>,
    next_generation: u64,
}

impl RegistryState {
    fn insert(&mut self, spec: TimerSpec, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.entries.insert(
            spec.name.clone(),
            ArmedTimer {
                spec,
                fire_at,
                armed_at: now,
                generation,
            },
        );
        generation
    }
}

/// Thread-safe map from timer name to its armed state.
///
/// Never fails: unknown names simply read as not armed.
#[derive(Default)]
pub struct AlarmRegistry {
    state: Mutex<RegistryState>,
    changed: Arc<Notify>,
}

impl AlarmRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when `name` currently has an armed entry.
    #[must_use]
    pub fn is_armed(&self, name: &str) -> bool {
        self.lock().entries.contains_key(name)
    }

    /// Planned fire time of `name`, when armed.
    #[must_use]
    pub fn fire_time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.lock().entries.get(name).map(|e| e.fire_at)
    }

    /// Full entry for `name`, when armed.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<ArmedTimer> {
        self.lock().entries.get(name).cloned()
    }

    /// Record `spec` as armed for `fire_at`, replacing any existing entry.
    ///
    /// Returns the new generation.
    pub fn mark_armed(&self, spec: TimerSpec, fire_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let generation = self.lock().insert(spec, fire_at, now);
        self.changed.notify_one();
        generation
    }

    /// Record `spec` as armed only when its name is not armed yet.
    ///
    /// Check and insert happen under one lock. Returns the new generation, or
    /// `None` when the name was already armed.
    pub fn try_mark_armed(
        &self,
        spec: TimerSpec,
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let generation = {
            let mut state = self.lock();
            if state.entries.contains_key(&spec.name) {
                return None;
            }
            state.insert(spec, fire_at, now)
        };
        self.changed.notify_one();
        Some(generation)
    }

    /// Move the fire time of `name` forward, keeping it armed, but only while
    /// `generation` is still current. Returns the new generation.
    pub fn advance_if_current(
        &self,
        name: &str,
        generation: u64,
        fire_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let advanced = {
            let mut state = self.lock();
            match state.entries.get(name) {
                Some(entry) if entry.generation == generation => {
                    let spec = entry.spec.clone();
                    Some(state.insert(spec, fire_at, now))
                }
                _ => None,
            }
        };
        if advanced.is_some() {
            self.changed.notify_one();
        }
        advanced
    }

    /// Remove the entry for `name`. Returns `true` when one existed.
    pub fn mark_disarmed(&self, name: &str) -> bool {
        let removed = self.lock().entries.remove(name).is_some();
        if removed {
            self.changed.notify_one();
        }
        removed
    }

    /// Remove the entry for `name` only while `generation` is current.
    ///
    /// Returns `false` for a stale generation, leaving the newer entry intact.
    pub fn disarm_if_current(&self, name: &str, generation: u64) -> bool {
        let removed = {
            let mut state = self.lock();
            match state.entries.get(name) {
                Some(entry) if entry.generation == generation => {
                    state.entries.remove(name);
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.changed.notify_one();
        }
        removed
    }

    /// Every armed entry, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ArmedTimer> {
        let mut entries: Vec<ArmedTimer> = self.lock().entries.values().cloned().collect();
        entries.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        entries
    }

    /// Number of armed timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// `true` when nothing is armed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notified after every change to the armed set.
    #[must_use]
    pub fn changes(&self) -> Arc<Notify> {
        Arc::clone(&self.changed)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AlarmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmRegistry")
            .field("armed", &self.len())
            .finish()
    }
}
