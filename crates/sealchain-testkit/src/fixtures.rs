//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use sealchain::crypto::EncryptedPayload;
use sealchain::{LocalCryptoService, Result, Session, SessionConfig};
use sealchain_core::{BlockRef, Keypair, Roster, ServerIdentity};
use sealchain_ledger::MemoryLedger;

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A roster of `nodes` servers with deterministic keys.
pub fn roster(nodes: usize) -> Roster {
    Roster::new(
        (0..nodes)
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[0] = i as u8;
                ServerIdentity {
                    address: format!("tls://node-{}.test:7770", i),
                    public: Keypair::from_seed(&seed).public_key(),
                }
            })
            .collect(),
    )
}

/// A bootstrapped session with its in-memory collaborators.
pub struct TestEnv {
    pub ledger: Arc<MemoryLedger>,
    pub crypto: Arc<LocalCryptoService>,
    pub session: Session,
}

impl TestEnv {
    /// Bootstrap a session over a three-node roster.
    pub async fn bootstrap(admin: &str) -> Self {
        Self::with_config(admin, SessionConfig::default()).await
    }

    pub async fn with_config(admin: &str, config: SessionConfig) -> Self {
        init_tracing();
        let ledger = Arc::new(MemoryLedger::new());
        let crypto = Arc::new(LocalCryptoService::new(ledger.clone()));
        let session = Session::bootstrap(&roster(3), admin, ledger.clone(), crypto.clone(), config)
            .await
            .expect("bootstrap over an in-memory ledger");
        Self {
            ledger,
            crypto,
            session,
        }
    }

    /// A second session restored from this one's snapshot, sharing the
    /// same collaborators.
    pub async fn fork(&self) -> Session {
        let bytes = self.session.to_bytes().await.expect("snapshot");
        Session::from_bytes(
            &bytes,
            self.ledger.clone(),
            self.crypto.clone(),
            self.session.config().clone(),
        )
        .expect("restore snapshot")
    }

    /// Encrypt `plaintext`, seal its key to the roster and store it as
    /// `writer`.
    pub async fn store_document(&self, writer: &str, plaintext: &[u8]) -> Result<BlockRef> {
        let (payload, key) = EncryptedPayload::seal(plaintext)?;
        let sealed = self.session.request_encryption_target(&key).await?;
        self.session.write_file(payload, sealed, writer).await
    }

    /// Request, fetch and decrypt `file` as `reader`.
    pub async fn read_document(&self, file: &BlockRef, reader: &str) -> Result<Vec<u8>> {
        let token = self.session.request_read(file, reader).await?;
        let contents = self.session.read_file(&token).await?;
        contents.decrypt(&self.session.keys(reader).await?)
    }
}
