//! Error types for M3U Core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
///
/// Playback faults reported by the engine are not errors of this kind; they
/// are published as [`PlaybackFault`](crate::fault::PlaybackFault) values.
#[derive(Error, Debug)]
pub enum Error {
    // Contract errors
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Session has been shut down")]
    SessionClosed,

    #[error("Operation cancelled by release")]
    Cancelled,

    // Resolution errors
    #[error("Entity not found: {0}")]
    EntityNotFound(i64),

    #[error("Parent playlist not found: {0}")]
    ParentNotFound(String),

    #[error("Invalid stream url: {url}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    // DRM errors
    #[error("DRM scheme not supported: {scheme}")]
    DrmNotSupported { scheme: String },

    #[error("Invalid DRM key material: {0}")]
    InvalidKeyMaterial(String),

    // Collaborator errors
    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Continue-watching store error: {0}")]
    Store(String),

    #[error("Playback engine error: {0}")]
    Engine(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a precondition violation
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::PreconditionViolation(msg.into())
    }

    /// Returns true if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Repository(_) | Error::Store(_) | Error::Engine(_) | Error::Io(_)
        )
    }

    /// Returns the error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::PreconditionViolation(_) => "PRECONDITION",
            Error::SessionClosed => "SESSION_CLOSED",
            Error::Cancelled => "CANCELLED",
            Error::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            Error::ParentNotFound(_) => "PARENT_NOT_FOUND",
            Error::InvalidUrl { .. } => "INVALID_URL",
            Error::DrmNotSupported { .. } => "DRM_UNSUPPORTED",
            Error::InvalidKeyMaterial(_) => "INVALID_KEY_MATERIAL",
            Error::Repository(_) => "REPOSITORY",
            Error::Store(_) => "STORE",
            Error::Engine(_) => "ENGINE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::precondition("x").error_code(), "PRECONDITION");
        assert_eq!(Error::EntityNotFound(7).error_code(), "ENTITY_NOT_FOUND");
        assert_eq!(Error::SessionClosed.to_string(), "Session has been shut down");
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::Repository("db locked".into()).is_recoverable());
        assert!(!Error::precondition("exhausted").is_recoverable());
        assert!(!Error::InvalidConfig("empty".into()).is_recoverable());
    }
}
