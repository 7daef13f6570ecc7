//! Shared helpers for integration tests.

use cadence::alarm::{AlarmRegistry, AlarmScheduler, ManualTimerFacility};
use cadence::config::TimerConfig;
use cadence::control::{BackgroundController, HeadlessCollaborators};
use cadence::{Signal, SignalBus};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// Monday 2024-01-01 09:00 UTC.
pub(crate) fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
}

/// A controller on virtual time whose dispatcher runs synchronously inside
/// each fire, so advancing the facility plays out whole sensor cycles.
pub(crate) struct Rig {
    pub controller: BackgroundController,
    pub facility: ManualTimerFacility,
    pub headless: HeadlessCollaborators,
    pub seen: Arc<Mutex<Vec<Signal>>>,
}

impl Rig {
    pub(crate) fn scheduler(&self) -> &AlarmScheduler {
        self.controller.scheduler()
    }

    pub(crate) fn seen(&self) -> Vec<Signal> {
        self.seen.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, signal: Signal) -> usize {
        self.seen().iter().filter(|s| **s == signal).count()
    }
}

pub(crate) fn rig_with(headless: HeadlessCollaborators, start: DateTime<Utc>) -> Rig {
    let facility = ManualTimerFacility::starting_at(start);
    let scheduler = AlarmScheduler::new(
        Arc::new(AlarmRegistry::new()),
        Arc::new(facility.clone()),
        Arc::new(facility.clone()),
        SignalBus::new(),
    );
    scheduler.reseed(0xcade);
    let controller =
        BackgroundController::new(scheduler, headless.collaborators(), TimerConfig::default());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dispatcher = Arc::clone(controller.dispatcher());
    controller.scheduler().bus().subscribe(
        Signal::ALL,
        Arc::new(move |signal: Signal| {
            sink.lock().unwrap().push(signal);
            dispatcher.dispatch(signal);
        }),
    );

    Rig {
        controller,
        facility,
        headless,
        seen,
    }
}

pub(crate) fn rig(registered: bool) -> Rig {
    rig_with(HeadlessCollaborators::new(registered), monday_morning())
}
