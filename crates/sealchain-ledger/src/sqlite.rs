//! SQLite implementation of the Ledger trait.
//!
//! rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking. Commits run in a transaction that re-reads the
//! tip, so concurrent writers through one connection or several see the
//! same stale-parent semantics as the in-memory ledger.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use sealchain_core::{BlockRef, ChainRef, Ed25519PublicKey, Ed25519Signature, Roster};

use crate::block::{Authorization, Block};
use crate::error::{LedgerError, Result};
use crate::migration;
use crate::traits::Ledger;

const BLOCK_COLUMNS: &str = "chain_id, idx, parent, payload, signer, signature, block_hash";

/// SQLite-backed ledger.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking to
/// avoid blocking the async runtime.
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open a database at `path`, creating and migrating it as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the connection from the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| LedgerError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| LedgerError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

fn blob<const N: usize>(row: &Row<'_>, idx: usize) -> rusqlite::Result<[u8; N]> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, format!("blob[{}]", N), rusqlite::types::Type::Blob))
}

fn optional_blob<const N: usize>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<[u8; N]>> {
    let bytes: Option<Vec<u8>> = row.get(idx)?;
    bytes
        .map(|b| {
            b.try_into().map_err(|_| {
                rusqlite::Error::InvalidColumnType(idx, format!("blob[{}]", N), rusqlite::types::Type::Blob)
            })
        })
        .transpose()
}

/// Columns in `BLOCK_COLUMNS` order.
fn row_to_block(row: &Row<'_>) -> rusqlite::Result<Block> {
    let chain = ChainRef::from_bytes(blob(row, 0)?);
    let index: i64 = row.get(1)?;
    let parent = optional_blob::<32>(row, 2)?.map(BlockRef::from_bytes);
    let payload: Vec<u8> = row.get(3)?;
    let signer = optional_blob::<32>(row, 4)?;
    let signature = optional_blob::<64>(row, 5)?;
    let hash = BlockRef::from_bytes(blob(row, 6)?);

    let authorization = match (signer, signature) {
        (Some(signer), Some(signature)) => Some(Authorization {
            signer: Ed25519PublicKey::from_bytes(signer),
            signature: Ed25519Signature::from_bytes(signature),
        }),
        _ => None,
    };

    Ok(Block {
        chain,
        index: index as u64,
        parent,
        payload: Bytes::from(payload),
        authorization,
        hash,
    })
}

fn insert_block(conn: &Connection, block: &Block) -> Result<()> {
    conn.execute(
        "INSERT INTO blocks (chain_id, idx, parent, payload, signer, signature, block_hash, committed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            block.chain.as_bytes().as_slice(),
            block.index as i64,
            block.parent.as_ref().map(|p| p.as_bytes().to_vec()),
            block.payload.as_ref(),
            block.authorization.as_ref().map(|a| a.signer.as_bytes().to_vec()),
            block.authorization.as_ref().map(|a| a.signature.as_bytes().to_vec()),
            block.hash.as_bytes().as_slice(),
            now_millis(),
        ],
    )?;
    Ok(())
}

fn latest_block(conn: &Connection, chain: &ChainRef) -> Result<Block> {
    conn.query_row(
        &format!(
            "SELECT {} FROM blocks WHERE chain_id = ?1 ORDER BY idx DESC LIMIT 1",
            BLOCK_COLUMNS
        ),
        params![chain.as_bytes().as_slice()],
        row_to_block,
    )
    .optional()?
    .ok_or_else(|| LedgerError::NotFound(format!("chain {}", chain)))
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn create_chain(&self, roster: &Roster, genesis: Bytes) -> Result<ChainRef> {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        let block = Block::genesis(roster, genesis, &salt);
        let chain = block.chain;

        let mut roster_bytes = Vec::new();
        ciborium::into_writer(roster, &mut roster_bytes)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let nodes = roster.len();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chains (chain_id, roster, created_at) VALUES (?1, ?2, ?3)",
                params![chain.as_bytes().as_slice(), roster_bytes, now_millis()],
            )?;
            insert_block(&tx, &block)?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!(%chain, nodes, "created chain");
        Ok(chain)
    }

    async fn commit_block(
        &self,
        chain: &ChainRef,
        parent: &BlockRef,
        payload: Bytes,
        authorization: Option<Authorization>,
    ) -> Result<BlockRef> {
        let chain = *chain;
        let parent = *parent;

        let result = self
            .blocking(move |conn| {
                let tx = conn.transaction()?;
                let block = latest_block(&tx, &chain)?.next(&parent, payload, authorization)?;
                insert_block(&tx, &block)?;
                tx.commit()?;
                Ok(block)
            })
            .await;

        match result {
            Ok(block) => {
                debug!(%chain, block = %block.hash, index = block.index, "committed block");
                Ok(block.hash)
            }
            Err(e) => {
                warn!(%chain, %parent, error = %e, "commit refused");
                Err(e)
            }
        }
    }

    async fn get_block(&self, chain: &ChainRef, block: &BlockRef) -> Result<Block> {
        let chain = *chain;
        let block = *block;
        self.blocking(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM blocks WHERE chain_id = ?1 AND block_hash = ?2",
                    BLOCK_COLUMNS
                ),
                params![chain.as_bytes().as_slice(), block.as_bytes().as_slice()],
                row_to_block,
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("block {}", block)))
        })
        .await
    }

    async fn get_block_at(&self, chain: &ChainRef, index: u64) -> Result<Block> {
        let chain = *chain;
        let idx = i64::try_from(index)
            .map_err(|_| LedgerError::NotFound(format!("block {} of {}", index, chain)))?;
        self.blocking(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM blocks WHERE chain_id = ?1 AND idx = ?2", BLOCK_COLUMNS),
                params![chain.as_bytes().as_slice(), idx],
                row_to_block,
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(format!("block {} of {}", index, chain)))
        })
        .await
    }

    async fn get_latest(&self, chain: &ChainRef) -> Result<BlockRef> {
        let chain = *chain;
        self.blocking(move |conn| Ok(latest_block(conn, &chain)?.hash))
            .await
    }

    async fn roster(&self, chain: &ChainRef) -> Result<Roster> {
        let chain = *chain;
        let bytes: Vec<u8> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT roster FROM chains WHERE chain_id = ?1",
                    params![chain.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| LedgerError::NotFound(format!("chain {}", chain)))
            })
            .await?;
        ciborium::from_reader(bytes.as_slice()).map_err(|e| LedgerError::Serialization(e.to_string()))
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
