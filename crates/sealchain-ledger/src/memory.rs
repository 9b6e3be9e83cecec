//! In-memory implementation of the Ledger trait.
//!
//! Same semantics as the SQLite ledger without persistence. Also used to
//! simulate an unreachable ledger in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use tracing::{debug, warn};

use sealchain_core::{BlockRef, ChainRef, Roster};

use crate::block::{Authorization, Block};
use crate::error::{LedgerError, Result};
use crate::traits::Ledger;

/// In-memory ledger. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryLedger {
    inner: RwLock<HashMap<ChainRef, MemoryChain>>,
    offline: AtomicBool,
}

struct MemoryChain {
    roster: Roster,
    blocks: Vec<Block>,
    by_hash: HashMap<BlockRef, usize>,
}

impl MemoryChain {
    fn latest(&self) -> &Block {
        // A chain always holds its genesis block.
        &self.blocks[self.blocks.len() - 1]
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of blocks on `chain`, genesis included.
    pub fn height(&self, chain: &ChainRef) -> usize {
        self.inner
            .read()
            .ok()
            .and_then(|chains| chains.get(chain).map(|c| c.blocks.len()))
            .unwrap_or(0)
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("ledger is offline".into()));
        }
        Ok(())
    }

    fn read<T>(&self, chain: &ChainRef, f: impl FnOnce(&MemoryChain) -> Result<T>) -> Result<T> {
        self.check_online()?;
        let chains = self.inner.read().map_err(poisoned)?;
        let state = chains
            .get(chain)
            .ok_or_else(|| LedgerError::NotFound(format!("chain {}", chain)))?;
        f(state)
    }
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::Unavailable("ledger lock poisoned".into())
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create_chain(&self, roster: &Roster, genesis: Bytes) -> Result<ChainRef> {
        self.check_online()?;
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);

        let block = Block::genesis(roster, genesis, &salt);
        let chain = block.chain;
        let mut by_hash = HashMap::new();
        by_hash.insert(block.hash, 0);

        let mut chains = self.inner.write().map_err(poisoned)?;
        chains.insert(
            chain,
            MemoryChain {
                roster: roster.clone(),
                blocks: vec![block],
                by_hash,
            },
        );
        debug!(%chain, nodes = roster.len(), "created chain");
        Ok(chain)
    }

    async fn commit_block(
        &self,
        chain: &ChainRef,
        parent: &BlockRef,
        payload: Bytes,
        authorization: Option<Authorization>,
    ) -> Result<BlockRef> {
        self.check_online()?;
        let mut chains = self.inner.write().map_err(poisoned)?;
        let state = chains
            .get_mut(chain)
            .ok_or_else(|| LedgerError::NotFound(format!("chain {}", chain)))?;

        let block = state.latest().next(parent, payload, authorization).map_err(|e| {
            warn!(%chain, %parent, error = %e, "commit refused");
            e
        })?;
        let hash = block.hash;
        state.by_hash.insert(hash, state.blocks.len());
        state.blocks.push(block);

        debug!(%chain, block = %hash, index = state.blocks.len() - 1, "committed block");
        Ok(hash)
    }

    async fn get_block(&self, chain: &ChainRef, block: &BlockRef) -> Result<Block> {
        self.read(chain, |state| {
            state
                .by_hash
                .get(block)
                .map(|&i| state.blocks[i].clone())
                .ok_or_else(|| LedgerError::NotFound(format!("block {}", block)))
        })
    }

    async fn get_block_at(&self, chain: &ChainRef, index: u64) -> Result<Block> {
        self.read(chain, |state| {
            usize::try_from(index)
                .ok()
                .and_then(|i| state.blocks.get(i))
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(format!("block {} of {}", index, chain)))
        })
    }

    async fn get_latest(&self, chain: &ChainRef) -> Result<BlockRef> {
        self.read(chain, |state| Ok(state.latest().hash))
    }

    async fn roster(&self, chain: &ChainRef) -> Result<Roster> {
        self.read(chain, |state| Ok(state.roster.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealchain_core::Keypair;

    #[tokio::test]
    async fn test_commit_advances_latest() {
        let ledger = MemoryLedger::new();
        let chain = ledger
            .create_chain(&Roster::new(vec![]), Bytes::from_static(b"g"))
            .await
            .unwrap();
        let genesis = ledger.get_latest(&chain).await.unwrap();
        assert_eq!(genesis, BlockRef::from(chain));

        let b1 = ledger
            .commit_block(&chain, &genesis, Bytes::from_static(b"one"), None)
            .await
            .unwrap();
        assert_eq!(ledger.get_latest(&chain).await.unwrap(), b1);
        assert_eq!(ledger.get_block(&chain, &b1).await.unwrap().payload, "one");
        assert_eq!(ledger.get_block_at(&chain, 1).await.unwrap().hash, b1);
        assert_eq!(ledger.height(&chain), 2);
    }

    #[tokio::test]
    async fn test_stale_parent_leaves_tip() {
        let ledger = MemoryLedger::new();
        let chain = ledger
            .create_chain(&Roster::new(vec![]), Bytes::new())
            .await
            .unwrap();
        let genesis = ledger.get_latest(&chain).await.unwrap();
        let b1 = ledger
            .commit_block(&chain, &genesis, Bytes::from_static(b"one"), None)
            .await
            .unwrap();

        let err = ledger
            .commit_block(&chain, &genesis, Bytes::from_static(b"late"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StaleParent { .. }));
        assert!(err.is_conflict());
        assert_eq!(ledger.get_latest(&chain).await.unwrap(), b1);
    }

    #[tokio::test]
    async fn test_bad_authorization_rejected() {
        let ledger = MemoryLedger::new();
        let chain = ledger
            .create_chain(&Roster::new(vec![]), Bytes::new())
            .await
            .unwrap();
        let genesis = ledger.get_latest(&chain).await.unwrap();
        let auth = Authorization::sign(&Keypair::generate(), &genesis, b"signed");

        let err = ledger
            .commit_block(&chain, &genesis, Bytes::from_static(b"swapped"), Some(auth))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
        assert_eq!(ledger.height(&chain), 1);
    }

    #[tokio::test]
    async fn test_offline_and_unknown_chain() {
        let ledger = MemoryLedger::new();
        assert!(matches!(
            ledger.get_latest(&ChainRef::ZERO).await,
            Err(LedgerError::NotFound(_))
        ));

        ledger.set_offline(true);
        assert!(matches!(
            ledger.create_chain(&Roster::new(vec![]), Bytes::new()).await,
            Err(LedgerError::Unavailable(_))
        ));
    }
}
