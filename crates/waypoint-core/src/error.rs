//! Error types for the Waypoint server

use thiserror::Error;

/// Errors surfaced by the rendezvous and signaling core
///
/// Every core operation returns one of these instead of panicking; the
/// transport layer maps each kind to a status code or an `error` frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("peer {0} is offline")]
    PeerOffline(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the server
pub type SignalResult<T> = Result<T, SignalError>;
