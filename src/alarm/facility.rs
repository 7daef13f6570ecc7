//! Timer facility: where pending fires actually live.
//!
//! The scheduler only ever asks the facility to hold one deadline per timer
//! name. [`TokioTimerFacility`] backs each deadline with a sleeping tokio task;
//! [`ManualTimerFacility`] keeps them in a list and fires them when virtual time
//! is advanced, which is what the deterministic tests drive.

use crate::error::{CadenceError, Result};
use chrono::{DateTime, FixedOffset, Local, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use super::timing;

/// Callback run when a pending fire comes due.
pub type FireCallback = Box<dyn FnOnce() + Send + 'static>;

/// Wall clock used for fire-time computation.
pub trait Clock: Send + Sync {
    /// Current local wall time, carrying the UTC offset in effect.
    fn now_local(&self) -> DateTime<FixedOffset>;

    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc> {
        self.now_local().with_timezone(&Utc)
    }
}

/// The host system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Holds at most one pending fire per timer name.
pub trait TimerFacility: Send + Sync {
    /// Register `callback` to run at `due`, replacing any pending fire
    /// registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::SchedulingUnavailable`] when the facility cannot
    /// accept registrations.
    fn arm(&self, name: &str, due: DateTime<Utc>, callback: FireCallback) -> Result<()>;

    /// Drop the pending fire for `name`, if any. Returns `true` when one existed.
    fn disarm(&self, name: &str) -> bool;

    /// Number of pending fires.
    fn pending_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Tokio-backed facility
// ---------------------------------------------------------------------------

/// Facility that sleeps on the tokio runtime it was created in.
pub struct TokioTimerFacility {
    handle: Handle,
    clock: Arc<dyn Clock>,
    pending: Arc<Mutex<HashMap<String, (u64, AbortHandle)>>>,
    next_ticket: Mutex<u64>,
}

impl TokioTimerFacility {
    /// Bind to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails with [`CadenceError::SchedulingUnavailable`] outside a runtime.
    pub fn from_current(clock: Arc<dyn Clock>) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| CadenceError::scheduling_unavailable("*", e.to_string()))?;
        Ok(Self::new(handle, clock))
    }

    /// Bind to an explicit runtime handle.
    #[must_use]
    pub fn new(handle: Handle, clock: Arc<dyn Clock>) -> Self {
        Self {
            handle,
            clock,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: Mutex::new(0),
        }
    }
}

impl TimerFacility for TokioTimerFacility {
    fn arm(&self, name: &str, due: DateTime<Utc>, callback: FireCallback) -> Result<()> {
        let ticket = {
            let mut next = lock(&self.next_ticket);
            *next = next.wrapping_add(1);
            *next
        };
        let delay = timing::until(self.clock.now(), due);
        let pending = Arc::clone(&self.pending);
        let owned_name = name.to_owned();

        let mut map = lock(&self.pending);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut map = lock(&pending);
                match map.get(&owned_name) {
                    Some((t, _)) if *t == ticket => {
                        map.remove(&owned_name);
                        true
                    }
                    _ => false,
                }
            };
            if current {
                callback();
            } else {
                trace!(timer = %owned_name, "superseded fire skipped");
            }
        });

        if let Some((_, previous)) = map.insert(name.to_owned(), (ticket, task.abort_handle())) {
            previous.abort();
            debug!(timer = name, "replaced pending fire");
        }
        Ok(())
    }

    fn disarm(&self, name: &str) -> bool {
        match lock(&self.pending).remove(name) {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl Drop for TokioTimerFacility {
    fn drop(&mut self) {
        for (_, (_, task)) in lock(&self.pending).drain() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Manual (virtual time) facility
// ---------------------------------------------------------------------------

struct ManualFire {
    name: String,
    due: DateTime<Utc>,
    callback: FireCallback,
}

struct ManualState {
    now: DateTime<FixedOffset>,
    pending: Vec<ManualFire>,
    available: bool,
}

/// Virtual-time facility that is also its own [`Clock`].
///
/// Nothing fires until [`advance`](Self::advance) or
/// [`advance_to`](Self::advance_to) moves time past a deadline.
#[derive(Clone)]
pub struct ManualTimerFacility {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTimerFacility {
    /// Start virtual time at `now`.
    #[must_use]
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now,
                pending: Vec::new(),
                available: true,
            })),
        }
    }

    /// Start virtual time at a UTC instant.
    #[must_use]
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self::new(now.fixed_offset())
    }

    /// Simulate the facility refusing (or accepting again) registrations.
    pub fn set_available(&self, available: bool) {
        lock(&self.state).available = available;
    }

    /// Due time of the pending fire for `name`.
    #[must_use]
    pub fn due_time(&self, name: &str) -> Option<DateTime<Utc>> {
        lock(&self.state)
            .pending
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.due)
    }

    /// Names of all pending fires, sorted.
    #[must_use]
    pub fn pending_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.state)
            .pending
            .iter()
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Advance virtual time by `by`, firing everything that comes due.
    ///
    /// Returns the number of callbacks run.
    pub fn advance(&self, by: std::time::Duration) -> usize {
        let target = {
            let state = lock(&self.state);
            state.now + chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::days(36_500))
        };
        self.advance_to(target.with_timezone(&Utc))
    }

    /// Advance virtual time to `target`, firing due callbacks in deadline
    /// order. Callbacks run without the facility lock held, so they may arm
    /// new fires; those also run if they fall due before `target`.
    pub fn advance_to(&self, target: DateTime<Utc>) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut state = lock(&self.state);
                let earliest = state
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.due <= target)
                    .min_by_key(|(_, f)| f.due)
                    .map(|(i, _)| i);
                match earliest {
                    Some(index) => {
                        let fire = state.pending.remove(index);
                        if fire.due > state.now.with_timezone(&Utc) {
                            let offset = *state.now.offset();
                            state.now = fire.due.with_timezone(&offset);
                        }
                        Some(fire)
                    }
                    None => {
                        let offset = *state.now.offset();
                        if target > state.now.with_timezone(&Utc) {
                            state.now = target.with_timezone(&offset);
                        }
                        None
                    }
                }
            };

            match next {
                Some(fire) => {
                    trace!(timer = %fire.name, due = %fire.due, "virtual fire");
                    (fire.callback)();
                    fired += 1;
                }
                None => return fired,
            }
        }
    }
}

impl Clock for ManualTimerFacility {
    fn now_local(&self) -> DateTime<FixedOffset> {
        lock(&self.state).now
    }
}

impl TimerFacility for ManualTimerFacility {
    fn arm(&self, name: &str, due: DateTime<Utc>, callback: FireCallback) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.available {
            return Err(CadenceError::scheduling_unavailable(
                name,
                "timer facility refused registration",
            ));
        }
        state.pending.retain(|f| f.name != name);
        state.pending.push(ManualFire {
            name: name.to_owned(),
            due,
            callback,
        });
        Ok(())
    }

    fn disarm(&self, name: &str) -> bool {
        let mut state = lock(&self.state);
        let before = state.pending.len();
        state.pending.retain(|f| f.name != name);
        state.pending.len() != before
    }

    fn pending_count(&self) -> usize {
        lock(&self.state).pending.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
