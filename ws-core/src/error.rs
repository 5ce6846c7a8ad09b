use std::fmt::{self, Display, Formatter};
use thiserror::Error;

/// Failure taxonomy of the runtime orchestrator.
///
/// Resource clients wrap transport failures into [`InfraError::Infrastructure`] and the
/// orchestrator propagates them unchanged; bounded waits report [`InfraError::Timeout`] and
/// cooperative cancellation reports [`InfraError::Interrupted`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InfraError {
    Infrastructure(String),
    Internal(String),
    Timeout(String),
    Interrupted(String),
    NotFound(String),
    InvalidState(String),
    Serialization(String),
}

impl Display for InfraError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            InfraError::Infrastructure(s) => write!(f, "{}", s),
            InfraError::Internal(s) => write!(f, "Internal infrastructure error: {}", s),
            InfraError::Timeout(s) => write!(f, "{}", s),
            InfraError::Interrupted(s) => write!(f, "{}", s),
            InfraError::NotFound(s) => write!(f, "{}", s),
            InfraError::InvalidState(s) => write!(f, "Invalid state: {}", s),
            InfraError::Serialization(s) => write!(f, "Serialization error: {}", s),
        }
    }
}

impl InfraError {
    /// Wrap any transport or control-plane failure, keeping its message.
    pub fn infra(err: impl Display) -> Self {
        InfraError::Infrastructure(err.to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, InfraError::Timeout(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, InfraError::Interrupted(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, InfraError::NotFound(_))
    }

    /// The bare message without the variant prefix, as carried by failure events.
    pub fn message(&self) -> &str {
        match self {
            InfraError::Infrastructure(s)
            | InfraError::Internal(s)
            | InfraError::Timeout(s)
            | InfraError::Interrupted(s)
            | InfraError::NotFound(s)
            | InfraError::InvalidState(s)
            | InfraError::Serialization(s) => s,
        }
    }
}

impl From<serde_yaml_ng::Error> for InfraError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        InfraError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        InfraError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InfraError>;
