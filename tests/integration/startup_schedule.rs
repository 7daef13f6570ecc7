use crate::helpers::{monday_morning, rig};
use cadence::alarm::{TimerKind, names};
use cadence::control::{StartupOutcome, StartupReport};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};

#[test]
fn registered_startup_arms_the_seven_builtin_timers() {
    let rig = rig(true);
    let outcome = rig.controller.start();
    assert_eq!(
        outcome,
        StartupOutcome::Ran(StartupReport {
            armed: 7,
            already_armed: 0,
            failed: 0
        })
    );

    let t0 = monday_morning();
    let s = rig.scheduler();
    assert_eq!(s.registry().len(), 7);
    assert_eq!(s.pending_fires(), 7);

    assert_eq!(s.next_fire(names::ACCELEROMETER), Some(t0 + ChronoDuration::seconds(5)));
    assert_eq!(s.next_fire(names::BLUETOOTH), Some(t0 + ChronoDuration::hours(1)));
    assert_eq!(s.next_fire(names::UPLOAD_DATA_FILES), Some(t0 + ChronoDuration::hours(1)));
    assert_eq!(
        s.next_fire(names::CHECK_FOR_NEW_SURVEYS),
        Some(t0 + ChronoDuration::hours(24))
    );
    assert_eq!(
        s.next_fire(names::VOICE_RECORDING),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap())
    );
    for fuzzy in [names::GPS, names::WIFI_LOG] {
        let due = s.next_fire(fuzzy).unwrap();
        assert!(due >= t0 + ChronoDuration::seconds(5), "{fuzzy} fired early");
        assert!(due < t0 + ChronoDuration::seconds(10), "{fuzzy} fired late");
    }

    let gps = s.registry().entry(names::GPS).unwrap();
    assert!(matches!(gps.spec.kind, TimerKind::SingularFuzzy { base_ms: 5_000 }));
}

#[test]
fn repeated_startup_never_duplicates_timers() {
    let rig = rig(true);
    rig.controller.start();
    let before: Vec<_> = rig
        .scheduler()
        .registry()
        .snapshot()
        .into_iter()
        .map(|e| (e.spec.name, e.fire_at))
        .collect();

    rig.controller.start();
    rig.controller.on_registration_complete();

    let after: Vec<_> = rig
        .scheduler()
        .registry()
        .snapshot()
        .into_iter()
        .map(|e| (e.spec.name, e.fire_at))
        .collect();
    assert_eq!(before, after);
    assert_eq!(rig.scheduler().pending_fires(), 7);
}

#[test]
fn unregistered_session_defers_until_registration() {
    let rig = rig(false);
    assert_eq!(rig.controller.start(), StartupOutcome::Deferred);
    rig.facility.advance(std::time::Duration::from_secs(3600));
    assert!(rig.seen().is_empty());

    rig.headless.session.set_registered(true);
    let report = rig.controller.on_registration_complete();
    assert_eq!(report.armed, 7);
    assert_eq!(rig.scheduler().pending_fires(), 7);
}
