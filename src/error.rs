//! Core error kinds — every fallible path in the crate converges here.
//!
//! Per the protocol-engine boundary rule: only the seam between this core
//! and the transport / reader / writer collaborators crosses the error
//! type (§9 of the design notes). Inside the core, errors propagate with
//! `?`; at a state machine's outermost edge they are handed to
//! `onSelfError` (see `protocol::dispatcher`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PpcError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid task param: {0}")]
    InvalidTaskParam(String),

    #[error("undefined task role: {0}")]
    UndefinedTaskRole(String),

    #[error("undefined command: {0}")]
    UndefinedCommand(String),

    #[error("unsupported curve type: {0}")]
    UnsupportedCurveType(String),

    #[error("unsupported hash type: {0}")]
    UnsupportedHashType(String),

    #[error("data format error: {0}")]
    DataFormatError(String),

    #[error("hash-to-curve failed after {attempts} attempts")]
    HashToCurveFailure { attempts: u32 },

    #[error("scalar invert failed: invalid scalar length")]
    ScalarInvertFailure,

    #[error("ec multiply failed: result is the point at infinity")]
    EcMultiplyFailure,

    #[error("x25519 batch failed: {0}")]
    X25519BatchFailure(String),

    #[error("ore plaintext out of range: |x| must be < 2^62")]
    OreOutOfRange,

    #[error("ore ciphertext too short: expected at least {expected} bytes, got {got}")]
    OreCipherTooShort { expected: usize, got: usize },

    #[error("refusing to overwrite existing item")]
    Overwrite,

    #[error("cannot remove missing item")]
    RemoveMissing,

    #[error("send failed: {0}")]
    SendFailure(String),

    #[error("peer sent ErrorNotification, task aborted")]
    PeerNotified,

    #[error("task timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),
}

pub type PpcResult<T> = Result<T, PpcError>;

impl From<postcard::Error> for PpcError {
    fn from(e: postcard::Error) -> Self {
        PpcError::Codec(e.to_string())
    }
}

impl PpcError {
    /// Whether this error kind indicates adversarial or corrupt input and
    /// therefore must never be retried (§7).
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            PpcError::HashToCurveFailure { .. }
                | PpcError::ScalarInvertFailure
                | PpcError::EcMultiplyFailure
                | PpcError::X25519BatchFailure(_)
                | PpcError::OreOutOfRange
                | PpcError::OreCipherTooShort { .. }
                | PpcError::DataFormatError(_)
        )
    }
}
