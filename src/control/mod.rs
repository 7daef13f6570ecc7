//! Control-signal handling: collaborator interfaces, the transition table and
//! the controller that runs the startup sequence.

pub mod collaborators;
pub mod controller;
pub mod dispatcher;
pub mod headless;

pub use collaborators::{
    Collaborators, NotificationKind, Notifier, SensorListener, Session, SurveyMetadataSource,
    Uploader, WifiScanner,
};
pub use controller::{BackgroundController, StartupOutcome, StartupReport};
pub use dispatcher::{ControlDispatcher, DispatchOutcome, refresh_surveys};
pub use headless::HeadlessCollaborators;
