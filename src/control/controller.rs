//! The background controller: wires scheduler, bus and dispatcher together,
//! arms the built-in timers once the session is registered, and owns the
//! automatic logout countdown.

use super::collaborators::Collaborators;
use super::dispatcher::ControlDispatcher;
use crate::alarm::{
    AlarmRegistry, AlarmScheduler, ArmOutcome, Clock, ReconcileReport, RegistrySnapshot,
    SystemClock, TimerKind, TimerSpec, TokioTimerFacility, names,
};
use crate::bus::SignalBus;
use crate::config::TimerConfig;
use crate::error::Result;
use crate::signal::Signal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Counts from one run of the startup sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub armed: usize,
    pub already_armed: usize,
    pub failed: usize,
}

/// Result of [`BackgroundController::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    Ran(StartupReport),
    /// Session not registered yet; waiting for
    /// [`BackgroundController::on_registration_complete`].
    Deferred,
}

/// Owns the scheduling core for one process.
pub struct BackgroundController {
    scheduler: AlarmScheduler,
    dispatcher: Arc<ControlDispatcher>,
    collaborators: Collaborators,
    timers: TimerConfig,
    startup_deferred: AtomicBool,
}

impl BackgroundController {
    pub fn new(scheduler: AlarmScheduler, collaborators: Collaborators, timers: TimerConfig) -> Self {
        let dispatcher = Arc::new(ControlDispatcher::new(
            scheduler.clone(),
            collaborators.clone(),
            timers.clone(),
        ));
        Self {
            scheduler,
            dispatcher,
            collaborators,
            timers,
            startup_deferred: AtomicBool::new(false),
        }
    }

    /// Build a controller on the current tokio runtime and the system clock.
    ///
    /// # Errors
    ///
    /// Fails outside a tokio runtime.
    pub fn with_tokio(
        registry: Arc<AlarmRegistry>,
        collaborators: Collaborators,
        timers: TimerConfig,
    ) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let facility = TokioTimerFacility::from_current(Arc::clone(&clock))?;
        let scheduler = AlarmScheduler::new(registry, Arc::new(facility), clock, SignalBus::new());
        Ok(Self::new(scheduler, collaborators, timers))
    }

    #[must_use]
    pub fn scheduler(&self) -> &AlarmScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<ControlDispatcher> {
        &self.dispatcher
    }

    /// Start dispatching bus signals until `cancel` fires.
    pub fn spawn_dispatcher(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        Arc::clone(&self.dispatcher).spawn(cancel)
    }

    /// Re-arm timers persisted by a previous run. Call before [`start`](Self::start).
    pub fn reconcile(&self, snapshot: &RegistrySnapshot) -> ReconcileReport {
        self.scheduler.reconcile(snapshot)
    }

    /// The seven timers every registered session runs.
    #[must_use]
    pub fn startup_timers(&self) -> Vec<TimerSpec> {
        let t = &self.timers;
        vec![
            TimerSpec::new(
                names::ACCELEROMETER,
                TimerKind::singular_exact(t.accel_timer_delay()),
                Signal::AccelerometerOn,
            ),
            TimerSpec::new(
                names::GPS,
                TimerKind::singular_fuzzy(t.gps_timer_delay()),
                Signal::GpsOn,
            ),
            TimerSpec::new(
                names::BLUETOOTH,
                TimerKind::periodic(t.bluetooth_cadence()),
                Signal::BluetoothOn,
            ),
            TimerSpec::new(
                names::WIFI_LOG,
                TimerKind::singular_fuzzy(t.wifi_timer_delay()),
                Signal::ActionWifiLog,
            ),
            TimerSpec::new(
                names::VOICE_RECORDING,
                TimerKind::DailyRepeating {
                    hour: t.voice_recording_hour,
                },
                Signal::VoiceRecording,
            ),
            TimerSpec::new(
                names::UPLOAD_DATA_FILES,
                TimerKind::periodic(t.upload_period()),
                Signal::UploadDataFiles,
            ),
            TimerSpec::new(
                names::CHECK_FOR_NEW_SURVEYS,
                TimerKind::periodic(t.survey_check_period()),
                Signal::CheckForNewSurveys,
            ),
        ]
    }

    /// Arm the startup timers when the session is registered, or defer until
    /// registration completes.
    pub fn start(&self) -> StartupOutcome {
        if self.collaborators.session.is_registered() {
            StartupOutcome::Ran(self.arm_startup_timers())
        } else {
            self.startup_deferred.store(true, Ordering::SeqCst);
            info!("session not registered; timer startup deferred");
            StartupOutcome::Deferred
        }
    }

    /// Run the deferred startup sequence. Timers that are already armed are
    /// left as they are, so calling this more than once is harmless.
    pub fn on_registration_complete(&self) -> StartupReport {
        if self.startup_deferred.swap(false, Ordering::SeqCst) {
            info!("registration complete; starting deferred timers");
        }
        self.arm_startup_timers()
    }

    /// `true` while startup waits for registration.
    #[must_use]
    pub fn is_startup_deferred(&self) -> bool {
        self.startup_deferred.load(Ordering::SeqCst)
    }

    /// (Re)start the automatic logout countdown and refresh the login.
    ///
    /// # Errors
    ///
    /// [`crate::CadenceError::SchedulingUnavailable`] when the timer cannot be armed.
    pub fn start_auto_logout_countdown(&self) -> Result<DateTime<Utc>> {
        let fire_at = self.scheduler.schedule_singular_exact(
            self.timers.auto_logout_delay(),
            names::SIGNOUT,
            Signal::Signout,
        )?;
        self.collaborators.session.refresh_login();
        Ok(fire_at)
    }

    /// Stop the automatic logout countdown. Returns `true` when one was running.
    pub fn clear_auto_logout_countdown(&self) -> bool {
        self.scheduler.cancel(names::SIGNOUT)
    }

    fn arm_startup_timers(&self) -> StartupReport {
        let mut report = StartupReport::default();
        for spec in self.startup_timers() {
            let name = spec.name.clone();
            match self.scheduler.arm_if_unset(spec) {
                Ok(ArmOutcome::Armed(_)) => report.armed += 1,
                Ok(ArmOutcome::AlreadyArmed) => report.already_armed += 1,
                Err(e) => {
                    warn!(timer = %name, "startup timer skipped: {e}");
                    report.failed += 1;
                }
            }
        }
        info!(
            armed = report.armed,
            already_armed = report.already_armed,
            failed = report.failed,
            "startup timers armed"
        );
        report
    }
}

impl std::fmt::Debug for BackgroundController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundController")
            .field("scheduler", &self.scheduler)
            .field("startup_deferred", &self.is_startup_deferred())
            .finish()
    }
}
