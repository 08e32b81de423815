//! Registry error taxonomy
//!
//! Every failure is terminal for the triggering call and surfaced
//! synchronously; the registry never retries internally. The gateway
//! translates these kinds into transport-level error codes.

use thiserror::Error;

/// Registry errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Caller is not a committee member")]
    Unauthorized,

    #[error("No consent for this patient and task")]
    ConsentDenied,

    #[error("Round not found")]
    RoundNotFound,

    #[error("Round is closed")]
    RoundClosed,

    #[error("Round participant cap reached")]
    CapacityExceeded,

    #[error("No unrevealed commit matches")]
    NoMatchingCommit,

    #[error("Round is not closed")]
    RoundNotClosed,

    #[error("No votes cast for this round")]
    NoVotes,
}

pub type Result<T> = std::result::Result<T, RegistryError>;
