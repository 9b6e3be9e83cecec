//! Keys sealed to a single X25519 recipient.
//!
//! The sender agrees on a secret with the recipient's public key through a
//! fresh ephemeral key, derives a wrapping key bound to a caller-chosen
//! context, and encrypts the key material with it. Opening with a
//! different context fails, so a sealed key cannot be replayed under
//! another purpose.

use serde::{Deserialize, Serialize};

use crate::crypto::{
    EncryptionKey, EncryptionNonce, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret,
};
use crate::error::{CryptoError, Result};

/// Key material encrypted for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedKey {
    /// Sender side of the key agreement.
    pub ephemeral_public: X25519PublicKey,

    pub nonce: EncryptionNonce,

    /// Wrapped key material with authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedKey {
    /// Seal `secret` to `recipient` under `context`.
    pub fn seal(secret: &[u8], recipient: &X25519PublicKey, context: &[u8]) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let wrap_key = ephemeral.diffie_hellman(recipient).derive_wrap_key(context);

        let nonce = EncryptionNonce::generate();
        let ciphertext = wrap_key.encrypt(secret, &nonce)?;

        Ok(Self {
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Seal a symmetric key.
    pub fn seal_key(key: &EncryptionKey, recipient: &X25519PublicKey, context: &[u8]) -> Result<Self> {
        Self::seal(key.as_bytes(), recipient, context)
    }

    /// Recover the sealed bytes.
    pub fn open(&self, recipient: &X25519StaticSecret, context: &[u8]) -> Result<Vec<u8>> {
        let wrap_key = recipient
            .diffie_hellman(&self.ephemeral_public)
            .derive_wrap_key(context);
        wrap_key.decrypt(&self.ciphertext, &self.nonce)
    }

    /// Recover a sealed symmetric key.
    pub fn open_key(&self, recipient: &X25519StaticSecret, context: &[u8]) -> Result<EncryptionKey> {
        EncryptionKey::from_slice(&self.open(recipient, context)?)
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
    use proptest::prelude::*;

    #[test]
    fn test_open_sealed_key() {
        let reader = X25519StaticSecret::generate();
        let key = EncryptionKey::generate();

        let sealed = SealedKey::seal_key(&key, &reader.public_key(), b"read-1").unwrap();
        assert_eq!(sealed.open_key(&reader, b"read-1").unwrap(), key);
    }

    #[test]
    fn test_wrong_recipient_or_context_fails() {
        let reader = X25519StaticSecret::generate();
        let other = X25519StaticSecret::generate();
        let key = EncryptionKey::generate();
        let sealed = SealedKey::seal_key(&key, &reader.public_key(), b"read-1").unwrap();

        assert!(sealed.open_key(&other, b"read-1").is_err());
        assert!(sealed.open_key(&reader, b"read-2").is_err());
    }

    #[test]
    fn test_open_key_rejects_short_material() {
        let reader = X25519StaticSecret::generate();
        let sealed = SealedKey::seal(b"short", &reader.public_key(), b"").unwrap();
        assert_eq!(sealed.open(&reader, b"").unwrap(), b"short");
        assert!(matches!(
            sealed.open_key(&reader, b""),
            Err(CryptoError::Decryption(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_seal_open(secret in proptest::collection::vec(any::<u8>(), 0..128),
                          context in proptest::collection::vec(any::<u8>(), 0..32)) {
            let reader = X25519StaticSecret::generate();
            let sealed = SealedKey::seal(&secret, &reader.public_key(), &context).unwrap();
            prop_assert_eq!(sealed.open(&reader, &context).unwrap(), secret);
        }
    }
}
