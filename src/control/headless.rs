//! Headless collaborators.
//!
//! These stand in for real hardware and services when the controller runs
//! without a device: each call is logged and counted so the daemon shows what
//! would have happened and tests can assert on it.

use super::collaborators::{
    Collaborators, NotificationKind, Notifier, SensorListener, Session, SurveyMetadataSource,
    Uploader, WifiScanner,
};
use crate::error::{CadenceError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Sensor that only records its state.
#[derive(Debug)]
pub struct HeadlessSensor {
    name: &'static str,
    supported: bool,
    on: AtomicBool,
    toggles: AtomicUsize,
}

impl HeadlessSensor {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            supported: true,
            on: AtomicBool::new(false),
            toggles: AtomicUsize::new(0),
        }
    }

    /// A sensor the device does not have.
    #[must_use]
    pub fn unsupported(name: &'static str) -> Self {
        Self {
            supported: false,
            ..Self::new(name)
        }
    }

    /// Number of on/off calls received.
    #[must_use]
    pub fn toggles(&self) -> usize {
        self.toggles.load(Ordering::SeqCst)
    }
}

impl SensorListener for HeadlessSensor {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn turn_on(&self) {
        self.on.store(true, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::SeqCst);
        info!(sensor = self.name, "sensor on");
    }

    fn turn_off(&self) {
        self.on.store(false, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::SeqCst);
        info!(sensor = self.name, "sensor off");
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct HeadlessWifi {
    scans: AtomicUsize,
}

impl HeadlessWifi {
    #[must_use]
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl WifiScanner for HeadlessWifi {
    fn scan(&self) {
        let n = self.scans.fetch_add(1, Ordering::SeqCst) + 1;
        info!(scan = n, "wifi scan");
    }
}

/// Uploader with nothing to send. Can be told to fail.
#[derive(Debug, Default)]
pub struct HeadlessUploader {
    uploads: AtomicUsize,
    failing: AtomicBool,
}

impl HeadlessUploader {
    #[must_use]
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Uploader for HeadlessUploader {
    async fn upload_all_files(&self) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CadenceError::Collaborator("upload server unreachable".into()));
        }
        info!("upload of queued data files complete");
        Ok(())
    }
}

/// Survey source serving a fixed list of documents.
#[derive(Debug, Default)]
pub struct HeadlessSurveySource {
    documents: Mutex<Vec<String>>,
    downloads: AtomicUsize,
    failing: AtomicBool,
}

impl HeadlessSurveySource {
    /// Replace the documents returned by later downloads.
    pub fn set_documents(&self, documents: Vec<String>) {
        *self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = documents;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurveyMetadataSource for HeadlessSurveySource {
    async fn download_survey_metadata(&self) -> Result<Vec<String>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CadenceError::Collaborator("survey server unreachable".into()));
        }
        Ok(self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[derive(Debug)]
pub struct HeadlessSession {
    registered: AtomicBool,
    logouts: AtomicUsize,
    refreshes: AtomicUsize,
    login_shown: AtomicUsize,
}

impl HeadlessSession {
    #[must_use]
    pub fn new(registered: bool) -> Self {
        Self {
            registered: AtomicBool::new(registered),
            logouts: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            login_shown: AtomicUsize::new(0),
        }
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    #[must_use]
    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn login_shown(&self) -> usize {
        self.login_shown.load(Ordering::SeqCst)
    }
}

impl Session for HeadlessSession {
    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        info!("session logged out");
    }

    fn refresh_login(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn show_login(&self) {
        self.login_shown.fetch_add(1, Ordering::SeqCst);
        info!("login requested");
    }
}

#[derive(Debug, Default)]
pub struct HeadlessNotifier {
    shown: Mutex<Vec<NotificationKind>>,
}

impl HeadlessNotifier {
    /// Notifications shown so far, oldest first.
    #[must_use]
    pub fn shown(&self) -> Vec<NotificationKind> {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for HeadlessNotifier {
    fn show_notification(&self, kind: NotificationKind) {
        info!(?kind, "notification");
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(kind);
    }
}

/// A full headless collaborator set with typed handles for inspection.
#[derive(Debug, Clone)]
pub struct HeadlessCollaborators {
    pub accelerometer: Arc<HeadlessSensor>,
    pub gps: Arc<HeadlessSensor>,
    pub bluetooth: Arc<HeadlessSensor>,
    pub wifi: Arc<HeadlessWifi>,
    pub uploader: Arc<HeadlessUploader>,
    pub surveys: Arc<HeadlessSurveySource>,
    pub session: Arc<HeadlessSession>,
    pub notifier: Arc<HeadlessNotifier>,
}

impl HeadlessCollaborators {
    /// All sensors supported; session registered as given.
    #[must_use]
    pub fn new(registered: bool) -> Self {
        Self {
            accelerometer: Arc::new(HeadlessSensor::new("accelerometer")),
            gps: Arc::new(HeadlessSensor::new("gps")),
            bluetooth: Arc::new(HeadlessSensor::new("bluetooth")),
            wifi: Arc::new(HeadlessWifi::default()),
            uploader: Arc::new(HeadlessUploader::default()),
            surveys: Arc::new(HeadlessSurveySource::default()),
            session: Arc::new(HeadlessSession::new(registered)),
            notifier: Arc::new(HeadlessNotifier::default()),
        }
    }

    /// Same set, but the device has no Bluetooth radio.
    #[must_use]
    pub fn without_bluetooth(mut self) -> Self {
        self.bluetooth = Arc::new(HeadlessSensor::unsupported("bluetooth"));
        self
    }

    /// Trait-object view handed to the controller.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            accelerometer: Some(self.accelerometer.clone()),
            gps: Some(self.gps.clone()),
            bluetooth: Some(self.bluetooth.clone()),
            wifi: Some(self.wifi.clone()),
            uploader: self.uploader.clone(),
            surveys: self.surveys.clone(),
            session: self.session.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
