//! # Sealchain Darc
//!
//! Distributed access-right controls: versioned policy documents whose
//! evolution is authorized by the owners of the previous version.
//!
//! ## Key Concepts
//!
//! - **Darc**: owners may evolve it, users may act on its behalf
//! - **Identity**: a raw Ed25519 key, or a reference to another Darc lineage
//! - **SignaturePath**: proof that a signer holds a role in the predecessor,
//!   possibly through nested references
//! - **Resolver**: evolves, verifies and publishes Darcs against a
//!   [`DarcSource`], bounding recursion and detecting reference cycles
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealchain_core::Keypair;
//! use sealchain_darc::{Darc, Identity, MemoryDarcStore, Resolver};
//!
//! async fn example() {
//!     let store = MemoryDarcStore::new();
//!     let owner = Keypair::generate();
//!     let me = Identity::PublicKey(owner.public_key());
//!
//!     let resolver = Resolver::new(&store);
//!     let v0 = Darc::genesis(vec![me.clone()], vec![], b"files".to_vec());
//!     resolver.publish(v0.clone()).await.unwrap();
//!
//!     let v1 = resolver
//!         .evolve(&v0, vec![me.clone()], vec![], b"files".to_vec(), &me, &owner)
//!         .await
//!         .unwrap();
//!     resolver.publish(v1).await.unwrap();
//! }
//! ```

pub mod darc;
pub mod error;
pub mod identity;
pub mod resolver;
pub mod source;

pub use darc::{Darc, DarcSignature, SignaturePath};
pub use error::{DarcError, Result};
pub use identity::{Identity, Role};
pub use resolver::{Resolution, ResolveCtx, Resolver, ResolverConfig, DEFAULT_MAX_DEPTH};
pub use source::{DarcSource, DarcStore, MemoryDarcStore};
