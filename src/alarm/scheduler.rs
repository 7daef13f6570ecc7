//! Alarm scheduling against a [`TimerFacility`].
//!
//! [`AlarmScheduler`] is a cheap cloneable handle. Every scheduling call
//! computes a fire time, records it in the [`AlarmRegistry`] and registers one
//! pending fire with the facility. When a fire comes due the scheduler checks
//! that it is still current, publishes the timer's signal on the
//! [`SignalBus`] and, for repeating kinds, re-arms the next occurrence anchored
//! to the planned fire rather than to the moment the callback ran.

use super::facility::{Clock, FireCallback, TimerFacility};
use super::persistence::{PersistedTimer, RegistrySnapshot};
use super::registry::AlarmRegistry;
use super::timer::{TimerKind, TimerSpec, duration_ms};
use super::timing;
use crate::bus::SignalBus;
use crate::error::{CadenceError, Result};
use crate::signal::Signal;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Result of [`AlarmScheduler::arm_if_unset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// The timer was not armed and now fires at the given time.
    Armed(DateTime<Utc>),
    /// The timer was already armed; its pending fire was left untouched.
    AlreadyArmed,
}

/// Counts from [`AlarmScheduler::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries re-armed at a future time.
    pub restored: usize,
    /// Singular entries whose time had passed, re-armed to fire immediately.
    pub overdue: usize,
    /// Entries skipped because the name was already armed.
    pub already_armed: usize,
    /// Entries dropped (unknown signal or refused by the facility).
    pub dropped: usize,
}

struct SchedulerInner {
    registry: Arc<AlarmRegistry>,
    facility: Arc<dyn TimerFacility>,
    clock: Arc<dyn Clock>,
    bus: SignalBus,
    rng: Mutex<StdRng>,
    /// Serializes the registry + facility pair for arm and cancel.
    arming: Mutex<()>,
}

/// Cloneable scheduler handle.
#[derive(Clone)]
pub struct AlarmScheduler {
    inner: Arc<SchedulerInner>,
}

impl AlarmScheduler {
    /// Create a scheduler over an explicit registry, facility, clock and bus.
    pub fn new(
        registry: Arc<AlarmRegistry>,
        facility: Arc<dyn TimerFacility>,
        clock: Arc<dyn Clock>,
        bus: SignalBus,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                facility,
                clock,
                bus,
                rng: Mutex::new(StdRng::from_entropy()),
                arming: Mutex::new(()),
            }),
        }
    }

    /// Replace the jitter source with a deterministic one.
    pub fn reseed(&self, seed: u64) {
        *lock(&self.inner.rng) = StdRng::seed_from_u64(seed);
    }

    /// Shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<AlarmRegistry> {
        &self.inner.registry
    }

    /// Bus fired timers publish on.
    #[must_use]
    pub fn bus(&self) -> &SignalBus {
        &self.inner.bus
    }

    /// Clock used for fire-time computation.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// `true` when `name` is armed.
    #[must_use]
    pub fn is_armed(&self, name: &str) -> bool {
        self.inner.registry.is_armed(name)
    }

    /// Planned next fire for `name`.
    #[must_use]
    pub fn next_fire(&self, name: &str) -> Option<DateTime<Utc>> {
        self.inner.registry.fire_time(name)
    }

    /// Pending fires held by the facility.
    #[must_use]
    pub fn pending_fires(&self) -> usize {
        self.inner.facility.pending_count()
    }

    /// Fire once, exactly `delay` from now.
    ///
    /// # Errors
    ///
    /// [`CadenceError::SchedulingUnavailable`] when the facility refuses.
    pub fn schedule_singular_exact(
        &self,
        delay: Duration,
        name: &str,
        signal: Signal,
    ) -> Result<DateTime<Utc>> {
        self.schedule(TimerSpec::new(name, TimerKind::singular_exact(delay), signal))
    }

    /// Fire once, `base + U[0, base)` from now.
    ///
    /// # Errors
    ///
    /// [`CadenceError::SchedulingUnavailable`] when the facility refuses.
    pub fn schedule_singular_fuzzy(
        &self,
        base: Duration,
        name: &str,
        signal: Signal,
    ) -> Result<DateTime<Utc>> {
        self.schedule(TimerSpec::new(name, TimerKind::singular_fuzzy(base), signal))
    }

    /// Fire every `period`, first one period from now.
    ///
    /// # Errors
    ///
    /// [`CadenceError::SchedulingUnavailable`] when the facility refuses or the
    /// period is zero.
    pub fn schedule_periodic_exact(
        &self,
        period: Duration,
        name: &str,
        signal: Signal,
    ) -> Result<DateTime<Utc>> {
        self.schedule(TimerSpec::new(name, TimerKind::periodic(period), signal))
    }

    /// Fire every day at `hour`:00 local time.
    ///
    /// # Errors
    ///
    /// [`CadenceError::SchedulingUnavailable`] when the facility refuses or the
    /// hour is outside 0-23.
    pub fn schedule_daily_repeating(
        &self,
        hour: u8,
        name: &str,
        signal: Signal,
    ) -> Result<DateTime<Utc>> {
        self.schedule(TimerSpec::new(name, TimerKind::DailyRepeating { hour }, signal))
    }

    /// Fire every week on `day_of_week` (0 = Sunday) at `hour`:00 local time.
    ///
    /// # Errors
    ///
    /// [`CadenceError::SchedulingUnavailable`] when the facility refuses or
    /// either field is out of range.
    pub fn schedule_weekly_repeating(
        &self,
        day_of_week: u8,
        hour: u8,
        name: &str,
        signal: Signal,
    ) -> Result<DateTime<Utc>> {
        self.schedule(TimerSpec::new(
            name,
            TimerKind::WeeklyRepeating { day_of_week, hour },
            signal,
        ))
    }

    /// Arm `spec`, replacing any pending fire under the same name.
    ///
    /// # Errors
    ///
    /// [`CadenceError::SchedulingUnavailable`]; the name is left disarmed.
    pub fn schedule(&self, spec: TimerSpec) -> Result<DateTime<Utc>> {
        let fire_at = self.first_fire(&spec)?;
        self.arm(spec, fire_at, true).map(|_| fire_at)
    }

    /// Arm `spec` only when its name is not armed yet.
    ///
    /// # Errors
    ///
    /// [`CadenceError::SchedulingUnavailable`]; the name is left disarmed.
    pub fn arm_if_unset(&self, spec: TimerSpec) -> Result<ArmOutcome> {
        if self.inner.registry.is_armed(&spec.name) {
            return Ok(ArmOutcome::AlreadyArmed);
        }
        let fire_at = self.first_fire(&spec)?;
        if self.arm(spec, fire_at, false)? {
            Ok(ArmOutcome::Armed(fire_at))
        } else {
            Ok(ArmOutcome::AlreadyArmed)
        }
    }

    /// Disarm `name` and drop its pending fire. Unarmed names are a no-op.
    ///
    /// Returns `true` when the timer was armed.
    pub fn cancel(&self, name: &str) -> bool {
        let _guard = lock(&self.inner.arming);
        let was_armed = self.inner.registry.mark_disarmed(name);
        self.inner.facility.disarm(name);
        if was_armed {
            debug!(timer = name, "timer cancelled");
        }
        was_armed
    }

    /// Re-arm timers from a persisted snapshot.
    ///
    /// Repeating entries resume at their next anchor after now, skipping
    /// missed occurrences. Singular entries keep their stored time, or fire
    /// immediately when it has passed. Names already armed are left alone.
    pub fn reconcile(&self, snapshot: &RegistrySnapshot) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let now = self.inner.clock.now();

        for persisted in &snapshot.timers {
            let Some(target) = Signal::parse(&persisted.target) else {
                warn!(
                    timer = %persisted.name,
                    target = %persisted.target,
                    "dropping persisted timer with unknown signal"
                );
                report.dropped += 1;
                continue;
            };
            let Some((fire_at, overdue)) = resume_time(persisted, now) else {
                warn!(
                    timer = %persisted.name,
                    kind = %persisted.kind,
                    "dropping persisted timer with no valid next fire"
                );
                report.dropped += 1;
                continue;
            };
            let spec = TimerSpec::new(persisted.name.clone(), persisted.kind, target);

            match self.arm(spec, fire_at, false) {
                Ok(true) if overdue => report.overdue += 1,
                Ok(true) => report.restored += 1,
                Ok(false) => report.already_armed += 1,
                Err(e) => {
                    warn!(timer = %persisted.name, "cannot restore timer: {e}");
                    report.dropped += 1;
                }
            }
        }

        info!(
            restored = report.restored,
            overdue = report.overdue,
            already_armed = report.already_armed,
            dropped = report.dropped,
            "registry reconciled"
        );
        report
    }

    fn first_fire(&self, spec: &TimerSpec) -> Result<DateTime<Utc>> {
        let now_local = self.inner.clock.now_local();
        let now = now_local.with_timezone(&Utc);
        let fire_at = match spec.kind {
            TimerKind::SingularExact { delay_ms } => now.checked_add_signed(millis(delay_ms)),
            TimerKind::SingularFuzzy { base_ms } => {
                let delay = timing::fuzzy_delay(
                    Duration::from_millis(base_ms),
                    &mut *lock(&self.inner.rng),
                );
                now.checked_add_signed(millis(duration_ms(delay)))
            }
            TimerKind::PeriodicExact { period_ms } => {
                (period_ms > 0)
                    .then(|| now.checked_add_signed(millis(period_ms)))
                    .flatten()
            }
            TimerKind::DailyRepeating { hour } => {
                timing::next_daily(&now_local, hour).map(|t| t.with_timezone(&Utc))
            }
            TimerKind::WeeklyRepeating { day_of_week, hour } => {
                timing::next_weekly(&now_local, day_of_week, hour).map(|t| t.with_timezone(&Utc))
            }
        };
        fire_at.ok_or_else(|| {
            warn!(timer = %spec.name, kind = %spec.kind, "timer has no valid fire time");
            CadenceError::scheduling_unavailable(&spec.name, format!("invalid timing: {}", spec.kind))
        })
    }

    /// Record and register one pending fire. With `replace` false the call is
    /// a no-op (returning `false`) when the name is already armed.
    fn arm(&self, spec: TimerSpec, fire_at: DateTime<Utc>, replace: bool) -> Result<bool> {
        let _guard = lock(&self.inner.arming);
        let now = self.inner.clock.now();
        let name = spec.name.clone();
        let kind = spec.kind;

        let generation = if replace {
            self.inner.registry.mark_armed(spec, fire_at, now)
        } else {
            match self.inner.registry.try_mark_armed(spec, fire_at, now) {
                Some(generation) => generation,
                None => return Ok(false),
            }
        };

        let callback = self.fire_callback(name.clone(), generation);
        if let Err(e) = self.inner.facility.arm(&name, fire_at, callback) {
            self.inner.registry.disarm_if_current(&name, generation);
            warn!(timer = %name, "timer not armed: {e}");
            return Err(e);
        }

        debug!(timer = %name, %kind, %fire_at, "timer armed");
        Ok(true)
    }

    fn fire_callback(&self, name: String, generation: u64) -> FireCallback {
        let inner: Weak<SchedulerInner> = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                AlarmScheduler { inner }.on_fire(&name, generation);
            }
        })
    }

    fn on_fire(&self, name: &str, generation: u64) {
        let Some(entry) = self
            .inner
            .registry
            .entry(name)
            .filter(|e| e.generation == generation)
        else {
            trace!(timer = name, generation, "stale fire dropped");
            return;
        };
        let target = entry.spec.target;

        let Some(interval) = entry.spec.kind.repeat_interval() else {
            // Disarm first so a handler re-arming this name is not undone.
            if self.inner.registry.disarm_if_current(name, generation) {
                debug!(timer = name, %target, "timer fired");
                self.inner.bus.publish(target);
            }
            return;
        };

        debug!(timer = name, %target, "repeating timer fired");
        self.inner.bus.publish(target);

        let _guard = lock(&self.inner.arming);
        let now = self.inner.clock.now();
        let Some(next) = timing::next_after(entry.fire_at, interval, &now) else {
            self.inner.registry.disarm_if_current(name, generation);
            warn!(
                timer = name,
                kind = %entry.spec.kind,
                "repeating timer has no next fire; dropped"
            );
            return;
        };
        let Some(next_generation) =
            self.inner
                .registry
                .advance_if_current(name, generation, next, now)
        else {
            trace!(timer = name, "timer changed during fire; not re-armed");
            return;
        };

        let callback = self.fire_callback(name.to_owned(), next_generation);
        if let Err(e) = self.inner.facility.arm(name, next, callback) {
            self.inner.registry.disarm_if_current(name, next_generation);
            warn!(timer = name, "repeating timer dropped: {e}");
        }
    }
}

impl std::fmt::Debug for AlarmScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmScheduler")
            .field("registry", &self.inner.registry)
            .field("pending", &self.inner.facility.pending_count())
            .finish()
    }
}

/// Where a persisted entry resumes, and whether it is overdue. `None` when a
/// repeating entry has no valid next occurrence.
fn resume_time(persisted: &PersistedTimer, now: DateTime<Utc>) -> Option<(DateTime<Utc>, bool)> {
    match persisted.kind.repeat_interval() {
        Some(interval) => {
            timing::next_after(persisted.fire_at, interval, &now).map(|next| (next, false))
        }
        None if persisted.fire_at > now => Some((persisted.fire_at, false)),
        None => Some((now, true)),
    }
}

fn millis(ms: u64) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
