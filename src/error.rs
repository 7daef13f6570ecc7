//! Error types for the cadence scheduling core.

/// Top-level error type for alarm scheduling and signal dispatch.
#[derive(Debug, thiserror::Error)]
pub enum CadenceError {
    /// The timer facility refused to register a fire (no runtime, permission
    /// denied, facility shut down).
    #[error("scheduling unavailable for timer '{timer}': {reason}")]
    SchedulingUnavailable {
        /// Timer name the registration was attempted for.
        timer: String,
        /// Facility-reported reason.
        reason: String,
    },

    /// Survey metadata field was missing or not usable; defaults apply.
    #[error("malformed survey metadata field '{field}': {reason}")]
    MalformedSurveyMetadata {
        /// JSON field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The device lacks the hardware capability a listener toggle needs.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(&'static str),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Registry snapshot persistence error.
    #[error("registry error: {0}")]
    Registry(String),

    /// Collaborator call failed (upload, survey download, session).
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CadenceError {
    /// Build a [`CadenceError::SchedulingUnavailable`] for the given timer.
    pub fn scheduling_unavailable(timer: &str, reason: impl Into<String>) -> Self {
        Self::SchedulingUnavailable {
            timer: timer.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CadenceError>;
