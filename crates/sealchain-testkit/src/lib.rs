//! # Sealchain Testkit
//!
//! Testing utilities for Sealchain.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: rosters and a bootstrapped session over an in-memory
//!   ledger and crypto service
//! - **Generators**: proptest strategies for pseudonyms, registry
//!   operations and policy evolution chains
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use sealchain::{Role, UserOp};
//! use sealchain_testkit::fixtures::TestEnv;
//!
//! async fn example() {
//!     let env = TestEnv::bootstrap("alice").await;
//!     env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
//!     let file = env.store_document("bob", b"invoice").await.unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sealchain_testkit::generators::{evolution_chain, EvolutionParams};
//!
//! proptest! {
//!     #[test]
//!     fn versions_are_consecutive(params: EvolutionParams) {
//!         let (_, chain) = evolution_chain(&params);
//!         for (i, darc) in chain.iter().enumerate() {
//!             prop_assert_eq!(darc.version as usize, i);
//!         }
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{init_tracing, roster, TestEnv};
pub use generators::{evolution_chain, EvolutionParams};
