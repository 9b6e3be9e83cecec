//! Pseudonymous credentials and their secret keys.
//!
//! A credential binds a pseudonym to two public keys: an Ed25519 key that
//! authenticates the holder's requests, and an X25519 key that receives
//! document keys. Both secrets derive from one 32-byte seed.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use sealchain_core::{Ed25519PublicKey, Ed25519Signature, Keypair};
use sealchain_crypto::{EncryptionKey, SealedKey, X25519PublicKey, X25519StaticSecret};

use crate::error::Result;

const SIGNING_DOMAIN: &str = "sealchain-v0-credential-signing";
const EXCHANGE_DOMAIN: &str = "sealchain-v0-credential-exchange";

/// Public side of a registered identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credential {
    pub pseudonym: String,

    /// Verifies signatures by the holder.
    pub public: Ed25519PublicKey,

    /// Receives re-encrypted document keys.
    pub exchange: X25519PublicKey,
}

/// Secret side of a credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialKeys {
    seed: [u8; 32],
}

impl CredentialKeys {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self { seed }
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    pub fn signing(&self) -> Keypair {
        Keypair::from_seed(&blake3::derive_key(SIGNING_DOMAIN, &self.seed))
    }

    pub fn exchange(&self) -> X25519StaticSecret {
        X25519StaticSecret::from_bytes(blake3::derive_key(EXCHANGE_DOMAIN, &self.seed))
    }

    /// The public credential for `pseudonym`.
    pub fn credential(&self, pseudonym: impl Into<String>) -> Credential {
        Credential {
            pseudonym: pseudonym.into(),
            public: self.signing().public_key(),
            exchange: self.exchange().public_key(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        self.signing().sign(message)
    }

    /// Open a document key sealed to this credential's exchange key.
    pub fn open(&self, sealed: &SealedKey, context: &[u8]) -> Result<EncryptionKey> {
        Ok(sealed.open_key(&self.exchange(), context)?)
    }
}

impl fmt::Debug for CredentialKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialKeys")
            .field("public", &self.signing().public_key())
            .finish_non_exhaustive()
    }
}
