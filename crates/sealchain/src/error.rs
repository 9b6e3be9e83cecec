//! Error types for the authorization protocol.

use thiserror::Error;

use sealchain_acl::AclError;
use sealchain_core::BlockRef;
use sealchain_crypto::CryptoError;
use sealchain_darc::DarcError;
use sealchain_ledger::LedgerError;

/// Coarse classification of a [`ProtocolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or inconsistent input; never retried.
    Validation,
    /// Rejected by policy; never retried.
    Authorization,
    /// The ledger tip moved; refresh and retry explicitly.
    CommitConflict,
    /// A ledger or the crypto service could not be reached.
    CollaboratorUnavailable,
    /// A session snapshot could not be written or read.
    Marshal,
}

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A policy document failed to evolve or verify.
    #[error("policy error: {0}")]
    Policy(#[from] DarcError),

    #[error("{0} is not a registered writer")]
    UnauthorizedWriter(String),

    #[error("{0} is not a registered reader")]
    UnauthorizedReader(String),

    /// The committed read request does not match what was signed.
    #[error("forged read request in block {0}")]
    ForgedRequest(BlockRef),

    /// The crypto service refused to re-encrypt for the read record.
    #[error("re-encryption refused: {0}")]
    ReencryptionRefused(String),

    #[error("no file stored in block {0}")]
    FileNotFound(BlockRef),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The ledger refused the commit, usually because its tip moved.
    #[error("commit conflict: {0}")]
    CommitConflict(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("crypto service unavailable: {0}")]
    CryptoServiceUnavailable(String),

    #[error("marshal error: {0}")]
    Marshal(String),

    #[error("unmarshal error: {0}")]
    Unmarshal(String),
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Validation { .. }
            | ProtocolError::Policy(_)
            | ProtocolError::FileNotFound(_)
            | ProtocolError::UnknownUser(_) => ErrorKind::Validation,
            ProtocolError::UnauthorizedWriter(_)
            | ProtocolError::UnauthorizedReader(_)
            | ProtocolError::ForgedRequest(_)
            | ProtocolError::ReencryptionRefused(_) => ErrorKind::Authorization,
            ProtocolError::CommitConflict(_) => ErrorKind::CommitConflict,
            ProtocolError::LedgerUnavailable(_) | ProtocolError::CryptoServiceUnavailable(_) => {
                ErrorKind::CollaboratorUnavailable
            }
            ProtocolError::Marshal(_) | ProtocolError::Unmarshal(_) => ErrorKind::Marshal,
        }
    }

    /// Whether the caller may retry, after a refresh for conflicts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::CommitConflict | ErrorKind::CollaboratorUnavailable
        )
    }
}

impl From<LedgerError> for ProtocolError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::StaleParent { .. } | LedgerError::Rejected { .. } => {
                ProtocolError::CommitConflict(e.to_string())
            }
            LedgerError::NotFound(what) => ProtocolError::Validation {
                field: "block",
                reason: format!("{} not found", what),
            },
            LedgerError::Serialization(reason) => ProtocolError::Validation {
                field: "block",
                reason,
            },
            LedgerError::Unavailable(_) | LedgerError::Database(_) | LedgerError::Migration(_) => {
                ProtocolError::LedgerUnavailable(e.to_string())
            }
        }
    }
}

impl From<CryptoError> for ProtocolError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Unavailable(reason) => ProtocolError::CryptoServiceUnavailable(reason),
            CryptoError::RecordRejected(reason) => ProtocolError::ReencryptionRefused(reason),
            other => ProtocolError::Validation {
                field: "key",
                reason: other.to_string(),
            },
        }
    }
}

impl From<AclError> for ProtocolError {
    fn from(e: AclError) -> Self {
        match e {
            AclError::NotFound { pseudonym, .. } => ProtocolError::UnknownUser(pseudonym),
            AclError::Serialization(reason) => ProtocolError::Validation {
                field: "registry",
                reason,
            },
            AclError::Crypto(e) => e.into(),
        }
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
