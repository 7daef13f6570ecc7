use crate::helpers::{monday_morning, rig, rig_with};
use cadence::alarm::{
    PersistedTimer, RegistrySnapshot, TimerKind, load_snapshot_from_path, names,
    save_snapshot_to_path,
};
use cadence::control::{HeadlessCollaborators, StartupOutcome, StartupReport};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::time::Duration;

/// Snapshot of a registered session with a running logout countdown, read
/// back from disk.
fn persisted_session(dir: &std::path::Path) -> RegistrySnapshot {
    let rig = rig(true);
    rig.controller.start();
    rig.controller.start_auto_logout_countdown().unwrap();

    let path = dir.join("alarms.json");
    save_snapshot_to_path(Some(&path), &RegistrySnapshot::capture(rig.scheduler().registry()))
        .expect("save snapshot");
    load_snapshot_from_path(Some(&path)).expect("load snapshot")
}

#[test]
fn restart_restores_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = persisted_session(dir.path());
    assert_eq!(snapshot.timers.len(), 8);

    let t0 = monday_morning();
    let later = t0 + ChronoDuration::hours(2);
    let rig = rig_with(HeadlessCollaborators::new(true), later);

    let report = rig.controller.reconcile(&snapshot);
    assert_eq!(report.restored, 4);
    assert_eq!(report.overdue, 4);
    assert_eq!(report.dropped, 0);

    assert_eq!(
        rig.controller.start(),
        StartupOutcome::Ran(StartupReport {
            armed: 0,
            already_armed: 7,
            failed: 0
        })
    );
    assert_eq!(rig.scheduler().pending_fires(), 8);

    // Missed hourly occurrences are skipped, not replayed.
    assert_eq!(
        rig.scheduler().next_fire(names::UPLOAD_DATA_FILES),
        Some(t0 + ChronoDuration::hours(3))
    );
    assert_eq!(
        rig.scheduler().next_fire(names::VOICE_RECORDING),
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0).unwrap())
    );
}

#[test]
fn overdue_countdown_logs_out_on_restore() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = persisted_session(dir.path());

    let rig = rig_with(
        HeadlessCollaborators::new(true),
        monday_morning() + ChronoDuration::hours(2),
    );
    rig.controller.reconcile(&snapshot);
    rig.facility.advance(Duration::ZERO);

    assert_eq!(rig.headless.session.logouts(), 1);
    assert!(!rig.scheduler().is_armed(names::SIGNOUT));
    assert!(rig.scheduler().is_armed(names::GPS));
}

#[test]
fn pending_countdown_keeps_its_time() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = persisted_session(dir.path());

    let t0 = monday_morning();
    let rig = rig_with(
        HeadlessCollaborators::new(true),
        t0 + ChronoDuration::seconds(60),
    );
    rig.controller.reconcile(&snapshot);
    assert_eq!(
        rig.scheduler().next_fire(names::SIGNOUT),
        Some(t0 + ChronoDuration::seconds(600))
    );
}

#[test]
fn entries_with_unknown_signals_are_dropped() {
    let now = monday_morning();
    let snapshot = RegistrySnapshot {
        version: 1,
        timers: vec![PersistedTimer {
            name: "legacy".into(),
            kind: TimerKind::PeriodicExact { period_ms: 60_000 },
            target: "not_a_signal".into(),
            fire_at: now,
            armed_at: now,
        }],
    };

    let rig = rig_with(HeadlessCollaborators::new(true), now);
    let report = rig.controller.reconcile(&snapshot);
    assert_eq!(report.dropped, 1);
    assert!(rig.scheduler().registry().is_empty());
}
