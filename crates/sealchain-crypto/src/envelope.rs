//! Encrypted document envelope.
//!
//! A document is encrypted once under a fresh symmetric key. The envelope
//! carries what a key holder needs to decrypt it; the key itself travels
//! separately as a [`SealedKey`](crate::SealedKey).

use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionKey, EncryptionNonce};
use crate::error::{CryptoError, Result};

/// Cipher used by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncryptionFormat {
    /// ChaCha20-Poly1305 with a 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// Ciphertext of a document plus decryption metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub format: EncryptionFormat,

    /// Unique per encryption.
    pub nonce: EncryptionNonce,

    /// Includes the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Encrypt `plaintext` under a fresh key and return both.
    pub fn seal(plaintext: &[u8]) -> Result<(Self, EncryptionKey)> {
        let key = EncryptionKey::generate();
        let payload = Self::encrypt(plaintext, &key)?;
        Ok((payload, key))
    }

    /// Encrypt `plaintext` under `key`.
    pub fn encrypt(plaintext: &[u8], key: &EncryptionKey) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;
        Ok(Self {
            format: EncryptionFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    pub fn decrypt(&self, key: &EncryptionKey) -> Result<Vec<u8>> {
        match self.format {
            EncryptionFormat::ChaCha20Poly1305 => key.decrypt(&self.ciphertext, &self.nonce),
        }
    }

    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CryptoError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CryptoError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_then_decrypt() {
        let (envelope, key) = EncryptedPayload::seal(b"invoice #42").unwrap();
        assert_eq!(envelope.decrypt(&key).unwrap(), b"invoice #42");
        assert!(envelope.decrypt(&EncryptionKey::generate()).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let (mut envelope, key) = EncryptedPayload::seal(b"invoice #42").unwrap();
        envelope.ciphertext[0] ^= 1;
        assert!(matches!(envelope.decrypt(&key), Err(CryptoError::Decryption(_))));
    }

    #[test]
    fn test_envelope_bytes() {
        let (envelope, _) = EncryptedPayload::seal(b"x").unwrap();
        let back = EncryptedPayload::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(envelope, back);
        assert!(EncryptedPayload::from_bytes(b"\xff\x00").is_err());
    }
}
