//! Database schema migrations for SQLite.
//!
//! Each migration moves the schema from version N to N+1 inside one
//! transaction, and is recorded in `schema_migrations`.

use rusqlite::Connection;

use crate::error::{LedgerError, Result};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(LedgerError::Migration(format!(
            "database schema {} is newer than supported {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;
        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }
        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(LedgerError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: chains and blocks.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE chains (
            chain_id BLOB PRIMARY KEY,        -- 32 bytes, genesis block hash
            roster BLOB NOT NULL,             -- CBOR-encoded roster
            created_at INTEGER NOT NULL
        );

        CREATE TABLE blocks (
            block_hash BLOB PRIMARY KEY,      -- 32 bytes
            chain_id BLOB NOT NULL REFERENCES chains(chain_id),
            idx INTEGER NOT NULL,             -- 0 for genesis
            parent BLOB,                      -- NULL only for genesis
            payload BLOB NOT NULL,
            signer BLOB,                      -- 32 bytes, Ed25519 key of the committer
            signature BLOB,                   -- 64 bytes
            committed_at INTEGER NOT NULL,

            UNIQUE(chain_id, idx)
        );

        CREATE INDEX idx_blocks_chain_idx ON blocks(chain_id, idx);
        "#,
    )?;
    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
