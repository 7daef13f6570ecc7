//! On-disk registry snapshot.
//!
//! The armed set is written as pretty JSON through a temp file and an atomic
//! rename. Writes happen on a background task woken by registry changes, so no
//! scheduling call ever touches the disk.

use super::registry::{AlarmRegistry, ArmedTimer};
use super::timer::TimerKind;
use crate::error::{CadenceError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const SNAPSHOT_VERSION: u8 = 1;

/// Quiet period after a change before the snapshot is written, so bursts of
/// re-arms collapse into one write.
const PERSIST_DEBOUNCE: Duration = Duration::from_millis(250);

/// One persisted timer. The target stays a raw wire name so an entry naming a
/// signal this build does not know can be dropped at load instead of failing
/// the whole file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTimer {
    pub name: String,
    pub kind: TimerKind,
    pub target: String,
    pub fire_at: DateTime<Utc>,
    pub armed_at: DateTime<Utc>,
}

impl From<&ArmedTimer> for PersistedTimer {
    fn from(armed: &ArmedTimer) -> Self {
        Self {
            name: armed.spec.name.clone(),
            kind: armed.spec.kind,
            target: armed.spec.target.as_str().to_owned(),
            fire_at: armed.fire_at,
            armed_at: armed.armed_at,
        }
    }
}

/// Persisted registry state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default = "default_snapshot_version")]
    pub version: u8,
    #[serde(default)]
    pub timers: Vec<PersistedTimer>,
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timers: Vec::new(),
        }
    }
}

impl RegistrySnapshot {
    /// Capture every armed timer in `registry`.
    #[must_use]
    pub fn capture(registry: &AlarmRegistry) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            timers: registry.snapshot().iter().map(PersistedTimer::from).collect(),
        }
    }
}

fn default_snapshot_version() -> u8 {
    SNAPSHOT_VERSION
}

/// Read a snapshot. A missing file, or no path at all, is an empty snapshot.
///
/// # Errors
///
/// Returns [`CadenceError::Registry`] when the file exists but cannot be read
/// or parsed.
pub fn load_snapshot_from_path(path: Option<&Path>) -> Result<RegistrySnapshot> {
    let Some(path) = path else {
        return Ok(RegistrySnapshot::default());
    };

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RegistrySnapshot::default());
        }
        Err(e) => {
            return Err(CadenceError::Registry(format!(
                "cannot read registry snapshot: {e}"
            )));
        }
    };

    let snapshot: RegistrySnapshot = serde_json::from_slice(&bytes)
        .map_err(|e| CadenceError::Registry(format!("cannot parse registry snapshot: {e}")))?;
    if snapshot.version > SNAPSHOT_VERSION {
        warn!(
            version = snapshot.version,
            supported = SNAPSHOT_VERSION,
            "registry snapshot is newer than this build; reading known fields only"
        );
    }
    Ok(snapshot)
}

/// Write a snapshot atomically. No path means persistence is disabled.
///
/// # Errors
///
/// Returns [`CadenceError::Registry`] on any filesystem or encoding failure.
pub fn save_snapshot_to_path(path: Option<&Path>, snapshot: &RegistrySnapshot) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CadenceError::Registry(format!("cannot create state dir: {e}")))?;
    }

    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| CadenceError::Registry(format!("cannot serialize snapshot: {e}")))?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)
        .map_err(|e| CadenceError::Registry(format!("cannot write snapshot temp file: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| CadenceError::Registry(format!("cannot finalize snapshot file: {e}")))?;
    Ok(())
}

/// Background writer that mirrors the registry to disk.
pub struct SnapshotPersister {
    registry: Arc<AlarmRegistry>,
    path: PathBuf,
}

impl SnapshotPersister {
    #[must_use]
    pub fn new(registry: Arc<AlarmRegistry>, path: PathBuf) -> Self {
        Self { registry, path }
    }

    /// Write the current armed set now.
    ///
    /// # Errors
    ///
    /// See [`save_snapshot_to_path`].
    pub fn flush(&self) -> Result<()> {
        let snapshot = RegistrySnapshot::capture(&self.registry);
        save_snapshot_to_path(Some(&self.path), &snapshot)?;
        debug!(
            path = %self.path.display(),
            timers = snapshot.timers.len(),
            "registry snapshot written"
        );
        Ok(())
    }

    /// Start the background loop. Each registry change schedules one write
    /// after a short quiet period; cancellation writes a final snapshot.
    pub fn run(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let changes = self.registry.changes();
        let persister = Arc::new(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        flush_in_background(Arc::clone(&persister)).await;
                        debug!("registry persister stopped");
                        break;
                    }
                    _ = changes.notified() => {
                        tokio::time::sleep(PERSIST_DEBOUNCE).await;
                        flush_in_background(Arc::clone(&persister)).await;
                    }
                }
            }
        })
    }
}

async fn flush_in_background(persister: Arc<SnapshotPersister>) {
    match tokio::task::spawn_blocking(move || persister.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("cannot persist registry snapshot: {e}"),
        Err(e) => error!("registry snapshot task failed: {e}"),
    }
}
