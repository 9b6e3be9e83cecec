//! Policy documents kept on a ledger chain.
//!
//! Every published version is one block. Lookups walk the chain back from
//! its latest block, so the first match for a lineage is its latest
//! version.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use sealchain_core::{ChainRef, DarcId, Roster};
use sealchain_darc::{Darc, DarcError, DarcSource, DarcStore};
use sealchain_ledger::{Ledger, LedgerError};

/// Genesis payload of a policy chain.
const POLICY_CHAIN_GENESIS: &[u8] = b"sealchain-policies-v0";

/// A [`DarcStore`] backed by one chain of a [`Ledger`].
pub struct LedgerDarcStore {
    ledger: Arc<dyn Ledger>,
    chain: ChainRef,
    commit: Mutex<()>,
}

fn source_error(e: LedgerError) -> DarcError {
    DarcError::Source(e.to_string())
}

impl LedgerDarcStore {
    /// Create a new policy chain maintained by `roster`.
    pub async fn create(ledger: Arc<dyn Ledger>, roster: &Roster) -> Result<Self, DarcError> {
        let chain = ledger
            .create_chain(roster, Bytes::from_static(POLICY_CHAIN_GENESIS))
            .await
            .map_err(source_error)?;
        Ok(Self::open(ledger, chain))
    }

    /// Use an existing policy chain.
    pub fn open(ledger: Arc<dyn Ledger>, chain: ChainRef) -> Self {
        Self {
            ledger,
            chain,
            commit: Mutex::new(()),
        }
    }

    pub fn chain(&self) -> ChainRef {
        self.chain
    }

    /// Newest published version matching `pred`.
    async fn find(&self, pred: impl Fn(&Darc) -> bool + Send) -> Result<Option<Darc>, DarcError> {
        let latest = self.ledger.get_latest(&self.chain).await.map_err(source_error)?;
        let mut block = self
            .ledger
            .get_block(&self.chain, &latest)
            .await
            .map_err(source_error)?;

        while let Some(parent) = block.parent {
            let darc = Darc::from_bytes(&block.payload)?;
            if pred(&darc) {
                return Ok(Some(darc));
            }
            block = self
                .ledger
                .get_block(&self.chain, &parent)
                .await
                .map_err(source_error)?;
        }
        Ok(None)
    }
}

#[async_trait]
impl DarcSource for LedgerDarcStore {
    async fn latest(&self, base: &DarcId) -> Result<Option<Darc>, DarcError> {
        let base = *base;
        self.find(move |darc| darc.base_id() == base).await
    }

    async fn get(&self, id: &DarcId) -> Result<Option<Darc>, DarcError> {
        let id = *id;
        self.find(move |darc| darc.id() == id).await
    }
}

#[async_trait]
impl DarcStore for LedgerDarcStore {
    async fn store(&self, darc: Darc) -> Result<(), DarcError> {
        let payload = Bytes::from(darc.to_bytes()?);
        let _guard = self.commit.lock().await;

        let parent = self.ledger.get_latest(&self.chain).await.map_err(source_error)?;
        let block = self
            .ledger
            .commit_block(&self.chain, &parent, payload, None)
            .await
            .map_err(source_error)?;

        debug!(darc = %darc.id(), version = darc.version, %block, "stored darc on ledger");
        Ok(())
    }
}
