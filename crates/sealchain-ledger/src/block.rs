//! Blocks and commit authorizations.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use sealchain_core::{
    domains, Blake3Hash, BlockRef, ChainRef, CoreError, Ed25519PublicKey, Ed25519Signature,
    Keypair, Roster,
};

use crate::error::{LedgerError, Result};

/// Signature by the committer over a block's parent and payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub signer: Ed25519PublicKey,
    pub signature: Ed25519Signature,
}

impl Authorization {
    /// Sign a commit of `payload` on top of `parent`.
    pub fn sign(keypair: &Keypair, parent: &BlockRef, payload: &[u8]) -> Self {
        let message = Self::message(parent, payload);
        Self {
            signer: keypair.public_key(),
            signature: keypair.sign(message.as_bytes()),
        }
    }

    /// The signed message.
    pub fn message(parent: &BlockRef, payload: &[u8]) -> Blake3Hash {
        let payload_hash = Blake3Hash::hash(payload);
        Blake3Hash::derive(
            domains::AUTHORIZATION,
            &[parent.as_bytes(), payload_hash.as_bytes()],
        )
    }

    pub fn verify(&self, parent: &BlockRef, payload: &[u8]) -> std::result::Result<(), CoreError> {
        let message = Self::message(parent, payload);
        self.signer.verify(message.as_bytes(), &self.signature)
    }
}

/// A committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub chain: ChainRef,

    /// Position in the chain; the genesis block is 0.
    pub index: u64,

    /// `None` only for the genesis block.
    pub parent: Option<BlockRef>,

    pub payload: Bytes,

    pub authorization: Option<Authorization>,

    /// Content hash over chain, index, parent and payload.
    pub hash: BlockRef,
}

impl Block {
    /// Build the genesis block of a new chain.
    ///
    /// The chain id is the genesis hash. `salt` separates chains created
    /// with the same roster and payload.
    pub fn genesis(roster: &Roster, payload: Bytes, salt: &[u8; 32]) -> Self {
        let roster_id = roster.id();
        let payload_hash = Blake3Hash::hash(&payload);
        let chain = ChainRef::from(Blake3Hash::derive(
            domains::BLOCK,
            &[roster_id.as_bytes(), salt, payload_hash.as_bytes()],
        ));

        Self {
            chain,
            index: 0,
            parent: None,
            payload,
            authorization: None,
            hash: BlockRef::from(chain),
        }
    }

    /// Build the block that follows `self`, checking the commit request.
    ///
    /// `self` must be the chain's latest block.
    pub fn next(
        &self,
        parent: &BlockRef,
        payload: Bytes,
        authorization: Option<Authorization>,
    ) -> Result<Self> {
        if *parent != self.hash {
            return Err(LedgerError::StaleParent {
                chain: self.chain,
                latest: self.hash,
                parent: *parent,
            });
        }
        if let Some(auth) = &authorization {
            auth.verify(parent, &payload)
                .map_err(|_| LedgerError::Rejected {
                    reason: "authorization signature does not verify".into(),
                })?;
        }

        let index = self.index + 1;
        Ok(Self {
            chain: self.chain,
            index,
            parent: Some(*parent),
            hash: Self::compute_hash(&self.chain, index, parent, &payload),
            payload,
            authorization,
        })
    }

    pub fn compute_hash(chain: &ChainRef, index: u64, parent: &BlockRef, payload: &[u8]) -> BlockRef {
        let payload_hash = Blake3Hash::hash(payload);
        BlockRef::from(Blake3Hash::derive(
            domains::BLOCK,
            &[
                chain.as_bytes(),
                &index.to_be_bytes(),
                parent.as_bytes(),
                payload_hash.as_bytes(),
            ],
        ))
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
