//! Signal dispatch: the state transition table.
//!
//! Each [`Signal`] maps to exactly one transition function through
//! [`transition_for`], an exhaustive `match`, so adding a signal without a
//! transition does not compile. A transition toggles a listener (if present
//! and supported) and re-arms the next timer in that sensor's cycle.

use super::collaborators::{Collaborators, NotificationKind, SensorListener};
use crate::alarm::{AlarmScheduler, names};
use crate::config::TimerConfig;
use crate::error::{CadenceError, Result};
use crate::signal::Signal;
use crate::survey;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// What a dispatch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Listener effect applied and follow-up timer (if any) armed.
    Applied,
    /// Listener missing or unsupported; the follow-up timer was still armed.
    CapabilityUnavailable,
    /// The follow-up timer could not be armed.
    RearmFailed,
    /// Work handed to a background task.
    Spawned,
    /// The signal names a timer, not a transition.
    NoTransition,
}

type Transition = fn(&ControlDispatcher) -> DispatchOutcome;

/// Transition for every signal.
fn transition_for(signal: Signal) -> Transition {
    match signal {
        Signal::AccelerometerOff => ControlDispatcher::accelerometer_off,
        Signal::AccelerometerOn => ControlDispatcher::accelerometer_on,
        Signal::BluetoothOff => ControlDispatcher::bluetooth_off,
        Signal::BluetoothOn => ControlDispatcher::bluetooth_on,
        Signal::GpsOff => ControlDispatcher::gps_off,
        Signal::GpsOn => ControlDispatcher::gps_on,
        Signal::ActionWifiLog => ControlDispatcher::wifi_log,
        Signal::VoiceRecording => ControlDispatcher::voice_recording,
        Signal::DailySurvey => ControlDispatcher::daily_survey,
        Signal::WeeklySurvey => ControlDispatcher::weekly_survey,
        Signal::Signout => ControlDispatcher::signout,
        Signal::UploadDataFiles => ControlDispatcher::upload_data_files,
        Signal::CheckForNewSurveys => ControlDispatcher::check_for_new_surveys,
        Signal::ActionAccelerometerTimer | Signal::ActionBluetoothTimer | Signal::ActionGpsTimer => {
            ControlDispatcher::no_transition
        }
    }
}

/// Executes the transition table against the collaborators.
pub struct ControlDispatcher {
    scheduler: AlarmScheduler,
    collaborators: Collaborators,
    timers: TimerConfig,
    tasks: TaskTracker,
}

impl ControlDispatcher {
    pub fn new(scheduler: AlarmScheduler, collaborators: Collaborators, timers: TimerConfig) -> Self {
        Self {
            scheduler,
            collaborators,
            timers,
            tasks: TaskTracker::new(),
        }
    }

    /// Run the transition for `signal`.
    pub fn dispatch(&self, signal: Signal) -> DispatchOutcome {
        let outcome = transition_for(signal)(self);
        debug!(%signal, ?outcome, "signal dispatched");
        outcome
    }

    /// Subscribe to every signal and dispatch until `cancel` fires.
    ///
    /// The subscription is registered before this returns, so no signal
    /// published afterwards is missed.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let bus = self.scheduler.bus().clone();
        let (subscription, mut rx) = bus.subscribe_channel(Signal::ALL);
        tokio::spawn(async move {
            info!("control dispatcher started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Some(signal) => {
                            self.dispatch(signal);
                        }
                        None => break,
                    },
                }
            }
            bus.unsubscribe(subscription);
            self.wait_idle().await;
            info!("control dispatcher stopped");
        })
    }

    /// Wait until every upload and survey download started so far has
    /// finished.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn accelerometer_off(&self) -> DispatchOutcome {
        let applied = self.toggle(self.collaborators.accelerometer.as_ref(), "accelerometer", false);
        self.rearmed(
            applied,
            self.scheduler.schedule_singular_exact(
                self.timers.accel_timer_delay(),
                names::ACCELEROMETER,
                Signal::AccelerometerOn,
            ),
        )
    }

    fn accelerometer_on(&self) -> DispatchOutcome {
        let applied = self.toggle(self.collaborators.accelerometer.as_ref(), "accelerometer", true);
        self.rearmed(
            applied,
            self.scheduler.schedule_singular_fuzzy(
                self.timers.accel_timer_delay(),
                names::ACCELEROMETER,
                Signal::AccelerometerOff,
            ),
        )
    }

    fn bluetooth_off(&self) -> DispatchOutcome {
        let applied = self.toggle(self.collaborators.bluetooth.as_ref(), "bluetooth", false);
        self.rearmed(
            applied,
            self.scheduler.schedule_periodic_exact(
                self.timers.bluetooth_cadence(),
                names::BLUETOOTH,
                Signal::BluetoothOn,
            ),
        )
    }

    fn bluetooth_on(&self) -> DispatchOutcome {
        let applied = self.toggle(self.collaborators.bluetooth.as_ref(), "bluetooth", true);
        self.rearmed(
            applied,
            self.scheduler.schedule_singular_exact(
                self.timers.bluetooth_scan_window(),
                names::BLUETOOTH,
                Signal::BluetoothOff,
            ),
        )
    }

    fn gps_off(&self) -> DispatchOutcome {
        let applied = self.toggle(self.collaborators.gps.as_ref(), "gps", false);
        self.rearmed(
            applied,
            self.scheduler.schedule_singular_fuzzy(
                self.timers.gps_timer_delay(),
                names::GPS,
                Signal::GpsOn,
            ),
        )
    }

    fn gps_on(&self) -> DispatchOutcome {
        let applied = self.toggle(self.collaborators.gps.as_ref(), "gps", true);
        self.rearmed(
            applied,
            self.scheduler.schedule_singular_exact(
                self.timers.gps_timer_delay(),
                names::GPS,
                Signal::GpsOff,
            ),
        )
    }

    fn wifi_log(&self) -> DispatchOutcome {
        let applied = match &self.collaborators.wifi {
            Some(wifi) => {
                wifi.scan();
                true
            }
            None => {
                unsupported("wifi");
                false
            }
        };
        self.rearmed(
            applied,
            self.scheduler.schedule_singular_fuzzy(
                self.timers.wifi_timer_delay(),
                names::WIFI_LOG,
                Signal::ActionWifiLog,
            ),
        )
    }

    fn voice_recording(&self) -> DispatchOutcome {
        self.notify(NotificationKind::VoiceRecording)
    }

    fn daily_survey(&self) -> DispatchOutcome {
        self.notify(NotificationKind::DailySurvey)
    }

    fn weekly_survey(&self) -> DispatchOutcome {
        self.notify(NotificationKind::WeeklySurvey)
    }

    fn signout(&self) -> DispatchOutcome {
        let session = &self.collaborators.session;
        session.logout();
        session.show_login();
        info!("automatic logout");
        DispatchOutcome::Applied
    }

    fn upload_data_files(&self) -> DispatchOutcome {
        let uploader = Arc::clone(&self.collaborators.uploader);
        self.spawn_task("upload", async move {
            if let Err(e) = uploader.upload_all_files().await {
                warn!("data upload failed: {e}");
            }
        })
    }

    fn check_for_new_surveys(&self) -> DispatchOutcome {
        let source = Arc::clone(&self.collaborators.surveys);
        let scheduler = self.scheduler.clone();
        self.spawn_task("survey download", async move {
            if let Err(e) = refresh_surveys(source.as_ref(), &scheduler).await {
                warn!("survey check failed: {e}");
            }
        })
    }

    fn no_transition(&self) -> DispatchOutcome {
        DispatchOutcome::NoTransition
    }

    fn toggle(
        &self,
        sensor: Option<&Arc<dyn SensorListener>>,
        capability: &'static str,
        on: bool,
    ) -> bool {
        match sensor {
            Some(sensor) if sensor.is_supported() => {
                if on {
                    sensor.turn_on();
                } else {
                    sensor.turn_off();
                }
                true
            }
            _ => {
                unsupported(capability);
                false
            }
        }
    }

    fn notify(&self, kind: NotificationKind) -> DispatchOutcome {
        self.collaborators.notifier.show_notification(kind);
        DispatchOutcome::Applied
    }

    fn rearmed(&self, applied: bool, rearm: Result<DateTime<Utc>>) -> DispatchOutcome {
        match rearm {
            Err(_) => DispatchOutcome::RearmFailed,
            Ok(_) if applied => DispatchOutcome::Applied,
            Ok(_) => DispatchOutcome::CapabilityUnavailable,
        }
    }

    fn spawn_task<F>(&self, what: &'static str, task: F) -> DispatchOutcome
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                self.tasks.spawn_on(task, &handle);
                DispatchOutcome::Spawned
            }
            Err(e) => {
                warn!("{what} skipped, no async runtime: {e}");
                DispatchOutcome::CapabilityUnavailable
            }
        }
    }
}

/// Download survey definitions and arm one repeating timer per survey.
///
/// # Errors
///
/// Returns the download error; per-survey scheduling failures are logged and
/// skipped.
pub async fn refresh_surveys(
    source: &dyn super::collaborators::SurveyMetadataSource,
    scheduler: &AlarmScheduler,
) -> Result<usize> {
    let documents = source.download_survey_metadata().await?;
    let mut armed = 0;
    for raw in &documents {
        let schedule = survey::resolve_str(raw);
        match scheduler.schedule(schedule.timer_spec()) {
            Ok(fire_at) => {
                info!(timer = %schedule.timer_name(), %fire_at, "survey scheduled");
                armed += 1;
            }
            Err(e) => warn!(timer = %schedule.timer_name(), "survey not scheduled: {e}"),
        }
    }
    Ok(armed)
}

fn unsupported(capability: &'static str) {
    let err = CadenceError::UnsupportedCapability(capability);
    debug!("{err}; toggle skipped");
}

impl std::fmt::Debug for ControlDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlDispatcher")
            .field("collaborators", &self.collaborators)
            .field("in_flight", &self.tasks.len())
            .finish()
    }
}
