//! Error types for the ledger module.

use thiserror::Error;

use sealchain_core::{BlockRef, ChainRef};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The commit's parent is not the chain's latest block.
    #[error("stale parent {parent} on chain {chain}: latest is {latest}")]
    StaleParent {
        chain: ChainRef,
        latest: BlockRef,
        parent: BlockRef,
    },

    /// The ledger refused the commit.
    #[error("commit rejected: {reason}")]
    Rejected { reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// The ledger cannot be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl LedgerError {
    /// Whether the commit lost a race and may succeed after a refresh.
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::StaleParent { .. } | LedgerError::Rejected { .. })
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
