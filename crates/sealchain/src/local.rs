//! A single-process stand-in for the threshold re-encryption service.
//!
//! Holds the whole roster key in one X25519 secret. It follows the same
//! contract as a distributed service, including revalidating the read
//! record on the ledger, but provides none of its trust distribution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use sealchain_acl::Credential;
use sealchain_core::Roster;
use sealchain_crypto::{CryptoError, EncryptionKey, SealedKey, X25519PublicKey, X25519StaticSecret};
use sealchain_ledger::{Ledger, LedgerError};

use crate::records::{DataBlock, RecordRef};
use crate::service::ThresholdCryptoService;

pub struct LocalCryptoService {
    secret: X25519StaticSecret,
    ledger: Arc<dyn Ledger>,
    offline: AtomicBool,
}

impl LocalCryptoService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_secret(X25519StaticSecret::generate(), ledger)
    }

    pub fn with_secret(secret: X25519StaticSecret, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            secret,
            ledger,
            offline: AtomicBool::new(false),
        }
    }

    /// The key documents are sealed to.
    pub fn shared_key(&self) -> X25519PublicKey {
        self.secret.public_key()
    }

    /// While offline every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), CryptoError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CryptoError::Unavailable("crypto service is offline".into()));
        }
        Ok(())
    }

    async fn fetch(&self, at: RecordRef) -> Result<DataBlock, CryptoError> {
        let block = self
            .ledger
            .get_block(&at.chain, &at.block)
            .await
            .map_err(|e| match e {
                LedgerError::NotFound(what) => CryptoError::RecordRejected(format!("{} not found", what)),
                other => CryptoError::Unavailable(other.to_string()),
            })?;
        DataBlock::from_bytes(&block.payload)
            .map_err(|e| CryptoError::RecordRejected(e.to_string()))
    }
}

fn rejected(reason: &str) -> CryptoError {
    warn!(reason, "re-encryption refused");
    CryptoError::RecordRejected(reason.to_string())
}

#[async_trait]
impl ThresholdCryptoService for LocalCryptoService {
    async fn encrypt_under_shared_key(
        &self,
        key: &EncryptionKey,
        roster: &Roster,
    ) -> Result<SealedKey, CryptoError> {
        self.check_online()?;
        SealedKey::seal_key(key, &self.shared_key(), roster.id().as_bytes())
    }

    async fn re_encrypt_for_reader(
        &self,
        encrypted_key: &SealedKey,
        read_record: &RecordRef,
        reader: &Credential,
    ) -> Result<SealedKey, CryptoError> {
        self.check_online()?;

        let request = match self.fetch(*read_record).await? {
            DataBlock::Read(request) => request,
            _ => return Err(rejected("record is not a read request")),
        };
        if request.verify(reader).is_err() {
            return Err(rejected("read request is not signed by the reader"));
        }

        let file = RecordRef {
            chain: read_record.chain,
            block: request.file,
        };
        match self.fetch(file).await? {
            DataBlock::Write(record) if record.encrypted_key == *encrypted_key => {}
            _ => return Err(rejected("key does not belong to the requested file")),
        }

        let roster = self
            .ledger
            .roster(&read_record.chain)
            .await
            .map_err(|e| CryptoError::Unavailable(e.to_string()))?;
        let key = encrypted_key.open_key(&self.secret, roster.id().as_bytes())?;
        let sealed = SealedKey::seal_key(&key, &reader.exchange, read_record.block.as_bytes())?;

        debug!(reader = %reader.pseudonym, record = %read_record.block, "re-encrypted key");
        Ok(sealed)
    }
}
