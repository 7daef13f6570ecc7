//! Cadence: the always-on background scheduling core of a mobile
//! data-collection client.
//!
//! Named alarms drive sensor on/off cycles, uploads, survey prompts and the
//! automatic logout. Every fired alarm publishes a [`Signal`] on the
//! [`SignalBus`]; the [`control::ControlDispatcher`] maps each signal to a
//! listener toggle and the next alarm in that cycle.
//!
//! # Architecture
//!
//! - **alarm**: registry of armed timers, fire-time rules, timer facilities,
//!   snapshot persistence and the [`AlarmScheduler`]
//! - **bus**: named-signal publish/subscribe
//! - **control**: collaborator interfaces, transition table and startup
//! - **survey**: survey metadata to prompt schedule
//! - **daemon**: process wiring used by the `cadence-daemon` binary

pub mod alarm;
pub mod bus;
pub mod cadence_dirs;
pub mod config;
pub mod control;
pub mod daemon;
pub mod error;
pub mod signal;
pub mod survey;

pub use alarm::{AlarmRegistry, AlarmScheduler};
pub use bus::SignalBus;
pub use config::CadenceConfig;
pub use control::BackgroundController;
pub use error::{CadenceError, Result};
pub use signal::Signal;
