//! Error types for the crypto crate.

use thiserror::Error;

/// Errors from encryption, sealing and the re-encryption service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Wrong key, wrong context, or tampered ciphertext.
    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The re-encryption service could not be reached.
    #[error("crypto service unavailable: {0}")]
    Unavailable(String),

    /// The re-encryption service refused the read record it was given.
    #[error("read record rejected: {0}")]
    RecordRejected(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
