//! Interfaces to the parts of the application this core drives but does not
//! own: sensor listeners, the uploader, the survey source, the session and
//! the notifier.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A sensor that can be switched on and off.
///
/// The listener owns its on/off state; the dispatcher only asks it to change.
pub trait SensorListener: Send + Sync {
    /// `false` when the device lacks the hardware. Toggles on an unsupported
    /// sensor are skipped.
    fn is_supported(&self) -> bool {
        true
    }

    fn turn_on(&self);

    fn turn_off(&self);

    /// Current state as the listener sees it.
    fn is_on(&self) -> bool;
}

/// Performs a single Wi-Fi scan and logs the results.
pub trait WifiScanner: Send + Sync {
    fn scan(&self);
}

/// Uploads every queued data file.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_all_files(&self) -> Result<()>;
}

/// Downloads survey definitions as raw JSON documents, one per survey.
#[async_trait]
pub trait SurveyMetadataSource: Send + Sync {
    async fn download_survey_metadata(&self) -> Result<Vec<String>>;
}

/// Login session state.
pub trait Session: Send + Sync {
    /// `true` once the device has completed registration.
    fn is_registered(&self) -> bool;

    fn logout(&self);

    /// Extend the logged-in period. Called when the logout countdown restarts.
    fn refresh_login(&self) {}

    /// Bring the login screen forward after a logout.
    fn show_login(&self) {}
}

/// User-visible prompt kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    VoiceRecording,
    DailySurvey,
    WeeklySurvey,
}

/// Shows user-facing notifications.
pub trait Notifier: Send + Sync {
    fn show_notification(&self, kind: NotificationKind);
}

/// Everything the dispatcher calls out to.
///
/// Sensors and the Wi-Fi scanner are optional: a missing one turns its
/// toggles into no-ops while the timers keep cycling.
#[derive(Clone)]
pub struct Collaborators {
    pub accelerometer: Option<Arc<dyn SensorListener>>,
    pub gps: Option<Arc<dyn SensorListener>>,
    pub bluetooth: Option<Arc<dyn SensorListener>>,
    pub wifi: Option<Arc<dyn WifiScanner>>,
    pub uploader: Arc<dyn Uploader>,
    pub surveys: Arc<dyn SurveyMetadataSource>,
    pub session: Arc<dyn Session>,
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("accelerometer", &self.accelerometer.is_some())
            .field("gps", &self.gps.is_some())
            .field("bluetooth", &self.bluetooth.is_some())
            .field("wifi", &self.wifi.is_some())
            .finish_non_exhaustive()
    }
}
