//! Error types for policy documents.

use sealchain_core::{CoreError, DarcId};
use thiserror::Error;

/// Errors raised while evolving, verifying or resolving policy documents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DarcError {
    /// A policy reference was revisited on the active resolution path.
    #[error("delegation cycle through darc {0}")]
    CycleDetected(DarcId),

    /// Resolution nested deeper than the configured maximum.
    #[error("delegation depth exceeded (max {max})")]
    DepthExceeded { max: usize },

    /// The signer could not be reached from the required policy.
    #[error("unknown signer: {0}")]
    UnknownSigner(String),

    /// The signature does not verify under the resolved key.
    #[error("bad signature")]
    BadSignature,

    /// Evolve was asked to sign with an identity that is not an owner.
    #[error("invalid signer: {0}")]
    InvalidSigner(String),

    /// The version does not follow its predecessor.
    #[error("version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    /// The document does not belong to the lineage of its predecessor.
    #[error("document does not extend the predecessor's lineage")]
    LineageMismatch,

    /// A non-genesis document carries no signature.
    #[error("document is unsigned")]
    Unsigned,

    /// The referenced policy is not known to the source.
    #[error("darc not found: {0}")]
    NotFound(DarcId),

    /// The policy source failed.
    #[error("darc source error: {0}")]
    Source(String),

    /// Encoding error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<CoreError> for DarcError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => DarcError::BadSignature,
            CoreError::EncodingError(msg) | CoreError::DecodingError(msg) => {
                DarcError::Serialization(msg)
            }
        }
    }
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, DarcError>;
