//! Named alarms: definitions, fire-time rules, the armed registry, timer
//! facilities, snapshot persistence and the scheduler that ties them together.

pub mod facility;
pub mod persistence;
pub mod registry;
pub mod scheduler;
pub mod timer;
pub mod timing;

pub use facility::{Clock, FireCallback, ManualTimerFacility, SystemClock, TimerFacility, TokioTimerFacility};
pub use persistence::{
    PersistedTimer, RegistrySnapshot, SnapshotPersister, load_snapshot_from_path,
    save_snapshot_to_path,
};
pub use registry::{AlarmRegistry, ArmedTimer};
pub use scheduler::{AlarmScheduler, ArmOutcome, ReconcileReport};
pub use timer::{TimerKind, TimerSpec, names};
