//! Error types for the handshake core.

use thiserror::Error;

/// Errors surfaced by handshake, session and registry operations.
///
/// The transport layer maps these onto its own status codes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid secret key: {0}")]
    InvalidKey(String),
}

impl HandshakeError {
    pub(crate) fn agent_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "agent",
            id: id.to_string(),
        }
    }

    pub(crate) fn handshake_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "handshake",
            id: id.to_string(),
        }
    }

    pub(crate) fn session_not_found() -> Self {
        // Tokens are credentials; never echo them back.
        Self::NotFound {
            kind: "session",
            id: "<redacted>".to_string(),
        }
    }

    pub(crate) fn unique_id_exhausted(kind: &str) -> Self {
        Self::Conflict(format!("could not allocate a unique {}", kind))
    }

    /// Returns true for the `NotFound` kind.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HandshakeError::NotFound { .. })
    }

    /// Returns true for the `Unauthorized` kind.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, HandshakeError::Unauthorized(_))
    }

    /// Returns true for the `Conflict` kind.
    pub fn is_conflict(&self) -> bool {
        matches!(self, HandshakeError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, HandshakeError>;
