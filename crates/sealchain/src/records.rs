//! Ledger payloads and the values handed to readers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use sealchain_acl::{Credential, CredentialKeys};
use sealchain_core::{domains, Blake3Hash, BlockRef, ChainRef, CoreError, Ed25519Signature};
use sealchain_crypto::{EncryptedPayload, SealedKey};

use crate::error::{ProtocolError, Result};

/// A stored document: the ciphertext, its key sealed to the roster, and
/// who wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub encrypted_data: EncryptedPayload,
    pub encrypted_key: SealedKey,
    pub writer: Credential,
}

/// A reader's signed request for a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    /// Block holding the requested write record.
    pub file: BlockRef,
    pub pseudonym: String,
    pub signature: Ed25519Signature,
}

impl ReadRequest {
    /// The message a reader signs to request `file`.
    pub fn message(file: &BlockRef) -> Blake3Hash {
        Blake3Hash::derive(domains::READ_REQUEST, &[file.as_bytes()])
    }

    pub fn sign(file: BlockRef, pseudonym: impl Into<String>, keys: &CredentialKeys) -> Self {
        Self {
            file,
            pseudonym: pseudonym.into(),
            signature: keys.sign(Self::message(&file).as_bytes()),
        }
    }

    /// Check the request was signed by `credential` under its pseudonym.
    pub fn verify(&self, credential: &Credential) -> std::result::Result<(), CoreError> {
        if self.pseudonym != credential.pseudonym {
            return Err(CoreError::InvalidSignature);
        }
        credential
            .public
            .verify(Self::message(&self.file).as_bytes(), &self.signature)
    }
}

/// Payload of a data ledger block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBlock {
    Genesis,
    Write(WriteRecord),
    Read(ReadRequest),
    /// A refused read attempt, recorded under `ReadAuditPolicy::RecordDenials`.
    DeniedRead { file: BlockRef, pseudonym: String },
}

impl DataBlock {
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ProtocolError::Validation {
            field: "payload",
            reason: e.to_string(),
        })?;
        Ok(Bytes::from(buf))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Validation {
            field: "payload",
            reason: e.to_string(),
        })
    }
}

/// Location of a block on a specific chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub chain: ChainRef,
    pub block: BlockRef,
}

/// Binds a token to the file, read record and reader it was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReencryptionHandle(pub Blake3Hash);

impl ReencryptionHandle {
    pub fn bind(file: &BlockRef, read_record: &BlockRef, reader: &Credential) -> Self {
        Self(Blake3Hash::derive(
            domains::REENCRYPTION_HANDLE,
            &[
                file.as_bytes(),
                read_record.as_bytes(),
                reader.public.as_bytes(),
                reader.exchange.as_bytes(),
            ],
        ))
    }
}

/// Proof of an authorized, committed read request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRequestToken {
    pub file_id: BlockRef,
    pub read_record_id: BlockRef,
    pub credential: Credential,
    pub handle: ReencryptionHandle,
}

impl FileRequestToken {
    pub(crate) fn issue(file_id: BlockRef, read_record_id: BlockRef, credential: Credential) -> Self {
        let handle = ReencryptionHandle::bind(&file_id, &read_record_id, &credential);
        Self {
            file_id,
            read_record_id,
            credential,
            handle,
        }
    }

    /// Whether the handle still matches the token's fields.
    pub fn is_intact(&self) -> bool {
        self.handle == ReencryptionHandle::bind(&self.file_id, &self.read_record_id, &self.credential)
    }
}

/// What a reader gets back: the stored ciphertext and its key sealed to
/// the reader's exchange key under the read record id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContents {
    pub ciphertext: EncryptedPayload,
    pub key: SealedKey,
    pub read_record_id: BlockRef,
}

impl FileContents {
    /// Open the key with the reader's secrets and decrypt the document.
    pub fn decrypt(&self, keys: &CredentialKeys) -> Result<Vec<u8>> {
        let key = keys.open(&self.key, self.read_record_id.as_bytes())?;
        Ok(self.ciphertext.decrypt(&key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_verifies_for_signer_only() {
        let keys = CredentialKeys::generate();
        let carol = keys.credential("carol");
        let file = BlockRef::from_bytes([3; 32]);

        let request = ReadRequest::sign(file, "carol", &keys);
        assert!(request.verify(&carol).is_ok());

        let other = CredentialKeys::generate().credential("carol");
        assert!(request.verify(&other).is_err());

        let mut renamed = request.clone();
        renamed.pseudonym = "dave".into();
        assert!(renamed.verify(&carol).is_err());

        let mut retargeted = request;
        retargeted.file = BlockRef::from_bytes([4; 32]);
        assert!(retargeted.verify(&carol).is_err());
    }

    #[test]
    fn test_token_handle_detects_edits() {
        let carol = CredentialKeys::generate().credential("carol");
        let token = FileRequestToken::issue(BlockRef::from_bytes([1; 32]), BlockRef::from_bytes([2; 32]), carol);
        assert!(token.is_intact());

        let mut moved = token.clone();
        moved.read_record_id = BlockRef::from_bytes([9; 32]);
        assert!(!moved.is_intact());

        let mut swapped = token;
        swapped.credential = CredentialKeys::generate().credential("carol");
        assert!(!swapped.is_intact());
    }

    #[test]
    fn test_data_block_bytes() {
        let block = DataBlock::DeniedRead {
            file: BlockRef::ZERO,
            pseudonym: "dave".into(),
        };
        assert_eq!(DataBlock::from_bytes(&block.to_bytes().unwrap()).unwrap(), block);
        assert!(DataBlock::from_bytes(b"\x00\x01").is_err());
    }
}
