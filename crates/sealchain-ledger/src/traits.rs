//! Ledger trait: the abstract interface to an append-only chain service.
//!
//! The protocol core drives two chains through this trait and never sees
//! how blocks are replicated or signed collectively.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use sealchain_core::{BlockRef, ChainRef, Roster};

use crate::block::{Authorization, Block};
use crate::error::Result;

/// An append-only ledger holding any number of chains.
///
/// # Design Notes
///
/// - **Single tip**: each chain has exactly one latest block, advanced only
///   by a successful `commit_block`.
/// - **Optimistic commits**: a commit names the parent it extends; if that
///   is no longer the latest block the commit fails with `StaleParent`.
/// - **Authorization**: when a commit carries an [`Authorization`] the
///   ledger verifies it against the parent and payload before accepting.
#[async_trait]
pub trait Ledger: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a chain maintained by `roster`, starting with `genesis`.
    async fn create_chain(&self, roster: &Roster, genesis: Bytes) -> Result<ChainRef>;

    /// Append `payload` on top of `parent`.
    async fn commit_block(
        &self,
        chain: &ChainRef,
        parent: &BlockRef,
        payload: Bytes,
        authorization: Option<Authorization>,
    ) -> Result<BlockRef>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_block(&self, chain: &ChainRef, block: &BlockRef) -> Result<Block>;

    /// The block at `index`, counting from the genesis block at 0.
    async fn get_block_at(&self, chain: &ChainRef, index: u64) -> Result<Block>;

    async fn get_latest(&self, chain: &ChainRef) -> Result<BlockRef>;

    async fn roster(&self, chain: &ChainRef) -> Result<Roster>;
}

#[async_trait]
impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    async fn create_chain(&self, roster: &Roster, genesis: Bytes) -> Result<ChainRef> {
        (**self).create_chain(roster, genesis).await
    }

    async fn commit_block(
        &self,
        chain: &ChainRef,
        parent: &BlockRef,
        payload: Bytes,
        authorization: Option<Authorization>,
    ) -> Result<BlockRef> {
        (**self).commit_block(chain, parent, payload, authorization).await
    }

    async fn get_block(&self, chain: &ChainRef, block: &BlockRef) -> Result<Block> {
        (**self).get_block(chain, block).await
    }

    async fn get_block_at(&self, chain: &ChainRef, index: u64) -> Result<Block> {
        (**self).get_block_at(chain, index).await
    }

    async fn get_latest(&self, chain: &ChainRef) -> Result<BlockRef> {
        (**self).get_latest(chain).await
    }

    async fn roster(&self, chain: &ChainRef) -> Result<Roster> {
        (**self).roster(chain).await
    }
}
