use crate::helpers::{monday_morning, rig, rig_with};
use cadence::Signal;
use cadence::alarm::names;
use cadence::control::{HeadlessCollaborators, NotificationKind, SensorListener};
use chrono::Duration as ChronoDuration;
use std::time::Duration;

#[test]
fn accelerometer_cycles_on_and_off() {
    let rig = rig(true);
    rig.controller.start();

    rig.facility.advance(Duration::from_secs(5));
    assert_eq!(rig.count(Signal::AccelerometerOn), 1);
    assert!(rig.headless.accelerometer.is_on());

    // Off after a jittered 5-10s, then on again exactly 5s later.
    rig.facility.advance(Duration::from_secs(10));
    assert_eq!(rig.count(Signal::AccelerometerOff), 1);
    rig.facility.advance(Duration::from_secs(5));
    assert_eq!(rig.count(Signal::AccelerometerOn), 2);

    assert_eq!(rig.scheduler().pending_fires(), 7);
}

#[test]
fn sensor_cycles_keep_one_pending_fire_per_timer() {
    let rig = rig(true);
    rig.controller.start();

    rig.facility.advance(Duration::from_secs(10 * 60));

    assert!(rig.count(Signal::GpsOn) >= 30);
    assert!(rig.count(Signal::ActionWifiLog) >= 60);
    assert!(rig.headless.wifi.scans() >= 60);
    assert_eq!(rig.scheduler().pending_fires(), 7);
    assert_eq!(rig.scheduler().registry().len(), 7);
}

#[test]
fn unsupported_bluetooth_keeps_hourly_cadence() {
    let headless = HeadlessCollaborators::new(true).without_bluetooth();
    let rig = rig_with(headless, monday_morning());
    rig.controller.start();
    let t0 = monday_morning();

    rig.facility.advance(Duration::from_secs(3600));
    assert_eq!(rig.count(Signal::BluetoothOn), 1);
    assert_eq!(
        rig.scheduler().next_fire(names::BLUETOOTH),
        Some(t0 + ChronoDuration::seconds(3605))
    );

    rig.facility.advance(Duration::from_secs(5));
    assert_eq!(rig.count(Signal::BluetoothOff), 1);
    assert_eq!(
        rig.scheduler().next_fire(names::BLUETOOTH),
        Some(t0 + ChronoDuration::seconds(2 * 3600 + 5))
    );
    assert_eq!(rig.headless.bluetooth.toggles(), 0);
}

#[test]
fn cancelled_sensor_timer_stops_its_cycle() {
    let rig = rig(true);
    rig.controller.start();
    rig.facility.advance(Duration::from_secs(30));
    let gps_before = rig.headless.gps.toggles();

    assert!(rig.scheduler().cancel(names::GPS));
    assert!(!rig.scheduler().cancel(names::GPS));
    rig.facility.advance(Duration::from_secs(300));

    assert_eq!(rig.headless.gps.toggles(), gps_before);
    assert!(!rig.scheduler().is_armed(names::GPS));
}

#[test]
fn voice_recording_prompts_daily() {
    let rig = rig(true);
    rig.controller.start();
    rig.facility.advance(Duration::from_secs(34 * 3600));

    let prompts = rig
        .headless
        .notifier
        .shown()
        .into_iter()
        .filter(|k| *k == NotificationKind::VoiceRecording)
        .count();
    assert_eq!(prompts, 2);
}

#[test]
fn auto_logout_fires_once_after_countdown() {
    let rig = rig(true);
    rig.controller.start_auto_logout_countdown().unwrap();
    rig.facility.advance(Duration::from_secs(599));
    assert_eq!(rig.headless.session.logouts(), 0);

    // Restarting the countdown pushes the logout out again.
    rig.controller.start_auto_logout_countdown().unwrap();
    rig.facility.advance(Duration::from_secs(599));
    assert_eq!(rig.headless.session.logouts(), 0);

    rig.facility.advance(Duration::from_secs(1));
    assert_eq!(rig.headless.session.logouts(), 1);
    assert_eq!(rig.headless.session.login_shown(), 1);
    assert!(!rig.scheduler().is_armed(names::SIGNOUT));
}

#[test]
fn cleared_countdown_never_logs_out() {
    let rig = rig(true);
    rig.controller.start_auto_logout_countdown().unwrap();
    assert!(rig.controller.clear_auto_logout_countdown());
    rig.facility.advance(Duration::from_secs(3600));
    assert_eq!(rig.headless.session.logouts(), 0);
}

#[tokio::test]
async fn survey_check_schedules_prompts_end_to_end() {
    let rig = rig(true);
    rig.headless.surveys.set_documents(vec![
        r#"{"survey_id": "mood", "hour_of_day": 8}"#.to_owned(),
        r#"{"survey_id": "sleep", "hour_of_day": 10, "day_of_week": 3}"#.to_owned(),
    ]);
    rig.controller.start();

    rig.facility.advance(Duration::from_secs(24 * 3600));
    rig.controller.dispatcher().wait_idle().await;
    assert_eq!(rig.headless.surveys.downloads(), 1);
    assert!(rig.headless.uploader.uploads() >= 24);
    assert!(rig.scheduler().is_armed("daily_survey:mood"));
    assert!(rig.scheduler().is_armed("weekly_survey:sleep"));

    // Wednesday 10:00 is the first weekly prompt.
    rig.facility.advance(Duration::from_secs(26 * 3600));
    assert_eq!(rig.count(Signal::WeeklySurvey), 1);
    assert_eq!(rig.count(Signal::DailySurvey), 1);
}
