//! # Sealchain
//!
//! Policy-gated encrypted documents on two ledgers.
//!
//! ## Overview
//!
//! A [`Session`] drives two chains:
//!
//! - **ACL chain**: every block is a [`CredentialRegistry`] snapshot naming
//!   admins, writers and readers
//! - **Data chain**: write records holding encrypted documents, and the read
//!   requests that form an append-only audit trail
//!
//! Document keys are sealed to the roster through a
//! [`ThresholdCryptoService`] and only re-encrypted for a reader once a
//! signed read request is on the data chain.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use sealchain::crypto::EncryptedPayload;
//! use sealchain::ledger::MemoryLedger;
//! use sealchain::{LocalCryptoService, Role, Session, SessionConfig, UserOp};
//! use sealchain::core::Roster;
//!
//! async fn example() -> sealchain::Result<()> {
//!     let ledger = Arc::new(MemoryLedger::new());
//!     let crypto = Arc::new(LocalCryptoService::new(ledger.clone()));
//!     let session =
//!         Session::bootstrap(&Roster::new(vec![]), "alice", ledger, crypto, SessionConfig::default())
//!             .await?;
//!
//!     session.manage_user(UserOp::Add, "bob", Role::Writer).await?;
//!     session.manage_user(UserOp::Add, "carol", Role::Reader).await?;
//!
//!     let (payload, key) = EncryptedPayload::seal(b"invoice")?;
//!     let sealed = session.request_encryption_target(&key).await?;
//!     let file = session.write_file(payload, sealed, "bob").await?;
//!
//!     let token = session.request_read(&file, "carol").await?;
//!     let contents = session.read_file(&token).await?;
//!     let plaintext = contents.decrypt(&session.keys("carol").await?)?;
//!     assert_eq!(plaintext, b"invoice");
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `sealchain::core` - hashes, keys, block and chain references
//! - `sealchain::darc` - policy documents and their resolution
//! - `sealchain::acl` - credentials and the registry
//! - `sealchain::ledger` - the ledger trait, in-memory and SQLite ledgers
//! - `sealchain::crypto` - document encryption and sealed keys

pub mod config;
pub mod darc_store;
pub mod error;
pub mod local;
pub mod records;
pub mod service;
pub mod session;

// Re-export component crates
pub use sealchain_acl as acl;
pub use sealchain_core as core;
pub use sealchain_crypto as crypto;
pub use sealchain_darc as darc;
pub use sealchain_ledger as ledger;

// Re-export main types for convenience
pub use config::{ReadAuditPolicy, SessionConfig};
pub use darc_store::LedgerDarcStore;
pub use error::{ErrorKind, ProtocolError, Result};
pub use local::LocalCryptoService;
pub use records::{
    DataBlock, FileContents, FileRequestToken, ReadRequest, RecordRef, ReencryptionHandle,
    WriteRecord,
};
pub use service::ThresholdCryptoService;
pub use session::{Session, SessionState, UserOp};

pub use sealchain_acl::{Credential, CredentialKeys, CredentialRegistry, Role};
