//! # Sealchain Crypto
//!
//! Encryption primitives for documents stored on the data ledger.
//!
//! ## Encryption Model
//!
//! 1. **Document key**: a fresh ChaCha20-Poly1305 key encrypts the document
//!    into an [`EncryptedPayload`]
//! 2. **Sealed key**: the document key is sealed to an X25519 public key,
//!    either the shared key of the ledger roster or a reader's exchange key
//!
//! The re-encryption step that turns the first kind of sealed key into the
//! second is performed by a threshold service outside this crate.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sealchain_crypto::{EncryptedPayload, SealedKey, X25519StaticSecret};
//!
//! let reader = X25519StaticSecret::generate();
//! let (envelope, key) = EncryptedPayload::seal(b"invoice").unwrap();
//! let sealed = SealedKey::seal_key(&key, &reader.public_key(), b"ctx").unwrap();
//!
//! let opened = sealed.open_key(&reader, b"ctx").unwrap();
//! assert_eq!(envelope.decrypt(&opened).unwrap(), b"invoice");
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod sealed;

pub use crypto::{
    EncryptionKey, EncryptionNonce, EphemeralKeyPair, SharedKey, X25519PublicKey,
    X25519StaticSecret,
};
pub use envelope::{EncryptedPayload, EncryptionFormat};
pub use error::{CryptoError, Result};
pub use sealed::SealedKey;
