//! # Sealchain Ledger
//!
//! The ledger collaborator: append-only chains of blocks, each chain
//! maintained by a roster of nodes.
//!
//! ## Overview
//!
//! The protocol core talks to ledgers only through the [`Ledger`] trait.
//! Two reference implementations are provided: [`SqliteLedger`] for a
//! persistent single-node ledger and [`MemoryLedger`] for tests.
//!
//! ## Key Types
//!
//! - [`Ledger`] - The async trait for chain operations
//! - [`Block`] - A committed block
//! - [`Authorization`] - The committer's signature over parent and payload
//!
//! ## Design Notes
//!
//! - **Stale parents**: a commit whose parent is not the latest block fails
//!   with [`LedgerError::StaleParent`]; nothing is retried
//! - **Chain ids**: a chain is named by the hash of its genesis block

pub mod block;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use block::{Authorization, Block};
pub use error::{LedgerError, Result};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::Ledger;
