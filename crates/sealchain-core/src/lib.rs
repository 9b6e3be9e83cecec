//! # Sealchain Core
//!
//! Pure primitives for Sealchain: keys, signatures, content-addressed
//! identifiers and canonical encoding.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`BlockRef`] - Content hash of a ledger block
//! - [`ChainRef`] - Identifier of a ledger (hash of its genesis block)
//! - [`DarcId`] - Digest of a policy document version
//! - [`Roster`] - Nodes that extend a ledger
//! - [`Keypair`] - Ed25519 signing key
//!
//! ## Canonicalization
//!
//! Everything that is hashed or signed is encoded with deterministic CBOR.
//! See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod types;

pub use canonical::{canonical_digest, canonical_value_bytes, domains, from_cbor, to_cbor};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::CoreError;
pub use types::{BlockRef, ChainRef, DarcId, Roster, ServerIdentity};
