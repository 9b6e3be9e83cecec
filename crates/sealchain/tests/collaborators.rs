//! Session behavior when collaborators fail or misbehave.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use sealchain::core::{BlockRef, ChainRef, Ed25519Signature, Roster};
use sealchain::crypto::{EncryptedPayload, X25519StaticSecret};
use sealchain::ledger::{
    Authorization, Block, Ledger, MemoryLedger, Result as LedgerResult, SqliteLedger,
};
use sealchain::{
    DataBlock, ErrorKind, LedgerDarcStore, LocalCryptoService, ProtocolError, Role, Session,
    SessionConfig, UserOp,
};
use sealchain_testkit::{init_tracing, roster, TestEnv};

/// Serves read requests back with their signature wiped, as a compromised
/// ledger node would.
struct TamperingLedger {
    inner: MemoryLedger,
}

#[async_trait]
impl Ledger for TamperingLedger {
    async fn create_chain(&self, roster: &Roster, genesis: Bytes) -> LedgerResult<ChainRef> {
        self.inner.create_chain(roster, genesis).await
    }

    async fn commit_block(
        &self,
        chain: &ChainRef,
        parent: &BlockRef,
        payload: Bytes,
        authorization: Option<Authorization>,
    ) -> LedgerResult<BlockRef> {
        self.inner.commit_block(chain, parent, payload, authorization).await
    }

    async fn get_block(&self, chain: &ChainRef, block: &BlockRef) -> LedgerResult<Block> {
        let mut block = self.inner.get_block(chain, block).await?;
        if let Ok(DataBlock::Read(mut request)) = DataBlock::from_bytes(&block.payload) {
            request.signature = Ed25519Signature::ZERO;
            block.payload = DataBlock::Read(request).to_bytes().unwrap();
        }
        Ok(block)
    }

    async fn get_block_at(&self, chain: &ChainRef, index: u64) -> LedgerResult<Block> {
        self.inner.get_block_at(chain, index).await
    }

    async fn get_latest(&self, chain: &ChainRef) -> LedgerResult<BlockRef> {
        self.inner.get_latest(chain).await
    }

    async fn roster(&self, chain: &ChainRef) -> LedgerResult<Roster> {
        self.inner.roster(chain).await
    }
}

#[tokio::test]
async fn test_forged_commit_withholds_token() {
    init_tracing();
    let ledger = Arc::new(TamperingLedger {
        inner: MemoryLedger::new(),
    });
    let crypto = Arc::new(LocalCryptoService::new(ledger.clone()));
    let session = Session::bootstrap(&roster(3), "alice", ledger.clone(), crypto, SessionConfig::default())
        .await
        .unwrap();
    session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    session.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap();

    let (payload, key) = EncryptedPayload::seal(b"invoice").unwrap();
    let sealed = session.request_encryption_target(&key).await.unwrap();
    let file = session.write_file(payload, sealed, "bob").await.unwrap();
    let height = ledger.inner.height(&session.data_chain());

    let err = session.request_read(&file, "carol").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let record = match err {
        ProtocolError::ForgedRequest(record) => record,
        other => panic!("expected a forged request, got {:?}", other),
    };

    // The audit block stays on the ledger.
    assert_eq!(ledger.inner.height(&session.data_chain()), height + 1);
    assert_eq!(session.latest_data().await, record);
}

#[tokio::test]
async fn test_ledger_unavailable_is_retryable() {
    let env = TestEnv::bootstrap("alice").await;
    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    let tip = env.session.latest_data().await;

    env.ledger.set_offline(true);
    let err = env.store_document("bob", b"invoice").await.unwrap_err();
    assert!(matches!(err, ProtocolError::LedgerUnavailable(_)));
    assert_eq!(err.kind(), ErrorKind::CollaboratorUnavailable);
    assert!(err.is_retryable());

    let err = env.session.refresh().await.unwrap_err();
    assert!(matches!(err, ProtocolError::LedgerUnavailable(_)));
    env.ledger.set_offline(false);

    assert_eq!(env.session.latest_data().await, tip);
    env.store_document("bob", b"invoice").await.unwrap();
}

#[tokio::test]
async fn test_crypto_unavailable() {
    let env = TestEnv::bootstrap("alice").await;
    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    env.session.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap();
    let file = env.store_document("bob", b"invoice").await.unwrap();
    let token = env.session.request_read(&file, "carol").await.unwrap();

    env.crypto.set_offline(true);
    let err = env.store_document("bob", b"more").await.unwrap_err();
    assert!(matches!(err, ProtocolError::CryptoServiceUnavailable(_)));
    assert!(err.is_retryable());

    let err = env.session.read_file(&token).await.unwrap_err();
    assert!(matches!(err, ProtocolError::CryptoServiceUnavailable(_)));

    // The token survives the outage.
    env.crypto.set_offline(false);
    let contents = env.session.read_file(&token).await.unwrap();
    let keys = env.session.keys("carol").await.unwrap();
    assert_eq!(contents.decrypt(&keys).unwrap(), b"invoice");
}

#[tokio::test]
async fn test_encryption_target_has_no_ledger_effect() {
    let env = TestEnv::bootstrap("alice").await;
    let acl = env.ledger.height(&env.session.acl_chain());
    let data = env.ledger.height(&env.session.data_chain());

    let (_, key) = EncryptedPayload::seal(b"draft").unwrap();
    env.session.request_encryption_target(&key).await.unwrap();
    env.session.request_encryption_target(&key).await.unwrap();

    assert_eq!(env.ledger.height(&env.session.acl_chain()), acl);
    assert_eq!(env.ledger.height(&env.session.data_chain()), data);
}

#[tokio::test]
async fn test_sqlite_session_survives_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let secret = X25519StaticSecret::generate();

    let (snapshot, file) = {
        let ledger = Arc::new(SqliteLedger::open(&path).unwrap());
        let crypto = Arc::new(LocalCryptoService::with_secret(secret.clone(), ledger.clone()));
        let session = Session::bootstrap(&roster(3), "alice", ledger, crypto, SessionConfig::default())
            .await
            .unwrap();
        session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
        session.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap();

        let (payload, key) = EncryptedPayload::seal(b"invoice").unwrap();
        let sealed = session.request_encryption_target(&key).await.unwrap();
        let file = session.write_file(payload, sealed, "bob").await.unwrap();
        (session.to_bytes().await.unwrap(), file)
    };

    let ledger = Arc::new(SqliteLedger::open(&path).unwrap());
    let crypto = Arc::new(LocalCryptoService::with_secret(secret, ledger.clone()));
    let session = Session::from_bytes(&snapshot, ledger, crypto, SessionConfig::default()).unwrap();

    let token = session.request_read(&file, "carol").await.unwrap();
    let contents = session.read_file(&token).await.unwrap();
    let keys = session.keys("carol").await.unwrap();
    assert_eq!(contents.decrypt(&keys).unwrap(), b"invoice");

    let requests = session.read_requests(None, 10).await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, token.read_record_id);
}

#[tokio::test]
async fn test_policies_on_shared_ledger() {
    use sealchain::core::Keypair;
    use sealchain::darc::{Darc, DarcSource, Identity, Resolver};

    let env = TestEnv::bootstrap("alice").await;
    let store = LedgerDarcStore::create(env.ledger.clone(), &roster(3)).await.unwrap();
    let resolver = Resolver::new(&store);

    let owner = Keypair::from_seed(&[7; 32]);
    let me = Identity::PublicKey(owner.public_key());
    let d0 = Darc::genesis(vec![me.clone()], vec![], b"invoices".to_vec());
    resolver.publish(d0.clone()).await.unwrap();
    let d1 = resolver
        .evolve(&d0, vec![me.clone()], vec![], b"invoices v1".to_vec(), &me, &owner)
        .await
        .unwrap();
    resolver.publish(d1.clone()).await.unwrap();

    // A stale evolution of d0 is refused once d1 is published.
    let stale = resolver
        .evolve(&d0, vec![me.clone()], vec![], b"other".to_vec(), &me, &owner)
        .await
        .unwrap();
    assert!(resolver.publish(stale).await.is_err());

    let reopened = LedgerDarcStore::open(env.ledger.clone(), store.chain());
    assert_eq!(reopened.latest(&d0.id()).await.unwrap(), Some(d1));
    assert_eq!(env.ledger.height(&store.chain()), 3);
}
