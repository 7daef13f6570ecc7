//! Process wiring for a long-running controller.
//!
//! Load the persisted armed set, reconcile it, run the startup sequence and
//! dispatch signals until cancelled. A deferred startup runs when
//! `registration` is notified. On the way out the dispatcher drains its
//! in-flight work and the persister writes a final snapshot.

use crate::alarm::{AlarmRegistry, SnapshotPersister, load_snapshot_from_path};
use crate::config::CadenceConfig;
use crate::control::{BackgroundController, Collaborators, StartupOutcome};
use crate::error::Result;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the controller until `cancel` fires.
///
/// Notify `registration` once the session has registered; an unregistered
/// start stays deferred until then. Notifications after startup has run are
/// ignored.
///
/// # Errors
///
/// Fails on invalid configuration or when no tokio runtime is available.
/// A missing or unreadable snapshot is logged and treated as empty.
pub async fn run(
    config: CadenceConfig,
    collaborators: Collaborators,
    registration: Arc<Notify>,
    cancel: CancellationToken,
) -> Result<()> {
    config.validate()?;

    let registry = Arc::new(AlarmRegistry::new());
    let state_path = config.registry.resolved_state_path();
    let snapshot = match load_snapshot_from_path(state_path.as_deref()) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!("starting without persisted timers: {e}");
            Default::default()
        }
    };

    let controller =
        BackgroundController::with_tokio(Arc::clone(&registry), collaborators, config.timers)?;
    let dispatcher = controller.spawn_dispatcher(cancel.child_token());
    controller.reconcile(&snapshot);

    let persister = state_path.map(|path| {
        info!(path = %path.display(), "persisting armed timers");
        SnapshotPersister::new(Arc::clone(&registry), path).run(cancel.child_token())
    });

    match controller.start() {
        StartupOutcome::Ran(report) => info!(armed = report.armed, "controller running"),
        StartupOutcome::Deferred => info!("controller waiting for registration"),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = registration.notified() => {
                if controller.is_startup_deferred() {
                    let report = controller.on_registration_complete();
                    info!(armed = report.armed, "deferred startup complete");
                }
            }
        }
    }
    info!("shutting down");

    if let Err(e) = dispatcher.await {
        warn!("dispatcher task ended abnormally: {e}");
    }
    if let Some(persister) = persister {
        if let Err(e) = persister.await {
            warn!("persister task ended abnormally: {e}");
        }
    }
    Ok(())
}
