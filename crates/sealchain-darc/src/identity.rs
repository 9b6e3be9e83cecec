//! Identities that may appear in a policy document.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use sealchain_core::{DarcId, Ed25519PublicKey};

/// Who may act on a policy: a raw key, or every signer of another policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// An Ed25519 verification key.
    PublicKey(Ed25519PublicKey),

    /// The lineage of another policy document, resolved to its latest
    /// version at verification time.
    PolicyRef(DarcId),
}

impl Identity {
    /// The key, if this identity is a raw key.
    pub fn as_public_key(&self) -> Option<&Ed25519PublicKey> {
        match self {
            Identity::PublicKey(pk) => Some(pk),
            Identity::PolicyRef(_) => None,
        }
    }

    pub(crate) fn to_cbor_value(&self) -> Value {
        match self {
            Identity::PublicKey(pk) => Value::Array(vec![
                Value::Integer(0.into()),
                Value::Bytes(pk.0.to_vec()),
            ]),
            Identity::PolicyRef(id) => Value::Array(vec![
                Value::Integer(1.into()),
                Value::Bytes(id.0.to_vec()),
            ]),
        }
    }
}

impl From<Ed25519PublicKey> for Identity {
    fn from(pk: Ed25519PublicKey) -> Self {
        Identity::PublicKey(pk)
    }
}

/// The capacity in which an identity appears in a policy document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May evolve the document to a new version.
    Owner,

    /// May sign on behalf of the document.
    User,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealchain_core::{canonical_value_bytes, Keypair};

    #[test]
    fn test_identity_encodings_differ_by_tag() {
        let bytes = [9u8; 32];
        let key = Identity::PublicKey(Ed25519PublicKey::from_bytes(bytes));
        let reference = Identity::PolicyRef(DarcId::from_bytes(bytes));

        let a = canonical_value_bytes(&key.to_cbor_value()).unwrap();
        let b = canonical_value_bytes(&reference.to_cbor_value()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_as_public_key() {
        let pk = Keypair::generate().public_key();
        assert_eq!(Identity::from(pk).as_public_key(), Some(&pk));
        assert_eq!(Identity::PolicyRef(DarcId::ZERO).as_public_key(), None);
    }
}
