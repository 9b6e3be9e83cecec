//! The threshold re-encryption collaborator.

use std::sync::Arc;

use async_trait::async_trait;

use sealchain_acl::Credential;
use sealchain_core::Roster;
use sealchain_crypto::{CryptoError, EncryptionKey, SealedKey};

use crate::records::RecordRef;

/// Encryption under a roster's shared key, and re-encryption of such keys
/// for individual readers.
///
/// Calls are stateless and have no ledger side effects, so they may be
/// retried freely. Implementations report unreachability as
/// [`CryptoError::Unavailable`] and refuse inconsistent read records with
/// [`CryptoError::RecordRejected`].
#[async_trait]
pub trait ThresholdCryptoService: Send + Sync {
    /// Seal `key` so that only the roster, jointly, can recover it.
    async fn encrypt_under_shared_key(
        &self,
        key: &EncryptionKey,
        roster: &Roster,
    ) -> Result<SealedKey, CryptoError>;

    /// Re-encrypt a roster-sealed key for `reader`.
    ///
    /// The service checks `read_record` on the ledger before acting: it
    /// must be a read request by `reader`, signed with the reader's key,
    /// for the file whose key is `encrypted_key`. The result is sealed to
    /// the reader's exchange key with the read record's block hash as
    /// context.
    async fn re_encrypt_for_reader(
        &self,
        encrypted_key: &SealedKey,
        read_record: &RecordRef,
        reader: &Credential,
    ) -> Result<SealedKey, CryptoError>;
}

#[async_trait]
impl<T: ThresholdCryptoService + ?Sized> ThresholdCryptoService for Arc<T> {
    async fn encrypt_under_shared_key(
        &self,
        key: &EncryptionKey,
        roster: &Roster,
    ) -> Result<SealedKey, CryptoError> {
        (**self).encrypt_under_shared_key(key, roster).await
    }

    async fn re_encrypt_for_reader(
        &self,
        encrypted_key: &SealedKey,
        read_record: &RecordRef,
        reader: &Credential,
    ) -> Result<SealedKey, CryptoError> {
        (**self).re_encrypt_for_reader(encrypted_key, read_record, reader).await
    }
}
