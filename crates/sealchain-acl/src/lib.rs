//! # Sealchain ACL
//!
//! Who may manage, write and read documents.
//!
//! ## Key Concepts
//!
//! - **Credential**: a pseudonym with a signing key and an exchange key
//! - **CredentialKeys**: the secrets behind a credential, derived from a seed
//! - **CredentialRegistry**: admins, writers and readers; every change
//!   produces a new snapshot that is committed as an ACL ledger block
//!
//! The registry always keeps at least one admin.

pub mod credential;
pub mod error;
pub mod registry;

pub use credential::{Credential, CredentialKeys};
pub use error::{AclError, Result};
pub use registry::{CredentialList, CredentialRegistry, Role};
