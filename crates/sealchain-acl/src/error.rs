//! Error types for the credential registry.

use thiserror::Error;

use crate::registry::Role;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// No credential with this pseudonym holds the role.
    #[error("{pseudonym} is not registered as {role}")]
    NotFound { role: Role, pseudonym: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] sealchain_crypto::CryptoError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, AclError>;
