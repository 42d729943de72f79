//! Error taxonomy shared by the tunnel, session and control-plane layers.
//!
//! Every fallible core operation returns [`GatewayError`]. Callers that need
//! to branch on the failure class (retry elsewhere vs. abandon) match on
//! [`GatewayError::kind`] rather than on message text.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Convenience alias used throughout the crate.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Coarse failure class, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    TransportFailure,
    ConcurrencyAbort,
}

/// What a [`GatewayError::NotFound`] was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Session,
    Tunnel,
    Protocol,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Session => "session",
            Self::Tunnel => "tunnel",
            Self::Protocol => "protocol",
        })
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown token, tunnel id or protocol name.
    #[error("{resource} not found: {key}")]
    NotFound { resource: Resource, key: String },

    /// Operation not valid in the current lifecycle state (closed tunnel,
    /// invalidated session, release without holding the lock).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The underlying channel failed while reading, writing or closing.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// A thread waiting for a stream lock was released because the tunnel
    /// closed underneath it.
    #[error("lock wait aborted: tunnel {0} closed")]
    ConcurrencyAbort(Uuid),
}

impl GatewayError {
    pub fn not_found(resource: Resource, key: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            key: key.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::TransportFailure(_) => ErrorKind::TransportFailure,
            Self::ConcurrencyAbort(_) => ErrorKind::ConcurrencyAbort,
        }
    }

    /// Message safe to return across the HTTP boundary.
    ///
    /// Never includes the token, tunnel id or transport detail carried by the
    /// error itself.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::NotFound {
                resource: Resource::Session,
                ..
            } => "No such session",
            Self::NotFound {
                resource: Resource::Tunnel,
                ..
            } => "No such tunnel",
            Self::NotFound {
                resource: Resource::Protocol,
                ..
            } => "Protocol not known",
            Self::InvalidState(_) => "Operation not permitted in current state",
            Self::TransportFailure(_) => "Backend connection error",
            Self::ConcurrencyAbort(_) => "Tunnel closed",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::TransportFailure(err.to_string())
    }
}
