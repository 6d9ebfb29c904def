//! Error types shared across the core crate.

use thiserror::Error;

/// Capability registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("engine capability '{0}' is already registered")]
    DuplicateCapability(String),
}

/// Failure raised by a capability while handling a command.
///
/// The engine isolates these per capability; they never abort a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability state unavailable: {0}")]
    StateUnavailable(String),
    #[error("capability failed: {0}")]
    Failed(String),
    #[error("capability panicked: {0}")]
    Panicked(String),
}

/// Local scene command rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("local scene editing is disabled")]
    EditingDisabled,
    #[error("placement '{0}' not found")]
    PlacementNotFound(String),
    #[error("invalid placement: {0}")]
    InvalidPlacement(String),
}

impl SceneError {
    /// Short machine-readable reason used in event payloads.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::EditingDisabled => "editing_disabled",
            Self::PlacementNotFound(_) => "placement_not_found",
            Self::InvalidPlacement(_) => "invalid_placement",
        }
    }
}

/// Invalid configuration override. Callers fall back to the default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: expected a boolean, got '{value}'")]
    InvalidBool { key: String, value: String },
    #[error("{key}: expected a positive integer, got '{value}'")]
    InvalidInteger { key: String, value: String },
    #[error("{key}: unknown value '{value}'")]
    UnknownValue { key: String, value: String },
}
