//! The policy document and its signature.
//!
//! A Darc names the identities that may evolve it (owners) and the
//! identities that may act on its behalf (users). A new version points to
//! its lineage and is signed by an owner of the version it replaces.

use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use sealchain_core::{canonical_digest, domains, from_cbor, to_cbor, DarcId, Ed25519Signature};

use crate::error::{DarcError, Result};
use crate::identity::{Identity, Role};

/// Field keys of the invariant digest.
mod keys {
    pub const OWNERS: u64 = 0;
    pub const USERS: u64 = 1;
    pub const VERSION: u64 = 2;
    pub const DESCRIPTION: u64 = 3;
    pub const BASE: u64 = 4;
}

/// A versioned access-policy document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Darc {
    /// Identities allowed to evolve this document.
    pub owners: Vec<Identity>,

    /// Identities allowed to act on behalf of this document.
    pub users: Vec<Identity>,

    /// Incremented by exactly one per evolution; 0 for a new lineage.
    pub version: u32,

    /// Free-form data; never interpreted.
    pub description: Vec<u8>,

    /// Id of version 0 of this lineage. `None` only on version 0.
    pub base: Option<DarcId>,

    /// Signature by an owner of the previous version. `None` on version 0.
    pub signature: Option<DarcSignature>,
}

/// Signature over a document's id, with the proof that the signer may give it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DarcSignature {
    pub signature: Ed25519Signature,
    pub path: SignaturePath,
}

/// Proof that a signer holds a role in the predecessor of a document.
///
/// `chain[0]` is the predecessor. Each following entry is the latest
/// version of a policy referenced by a member of the entry before it. The
/// signer is a member of the last entry, in the recorded role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePath {
    pub chain: Vec<Darc>,
    pub signer: Identity,
    pub role: Role,
}

impl Darc {
    /// Start a new lineage. Version 0 is unsigned.
    pub fn genesis(
        owners: Vec<Identity>,
        users: Vec<Identity>,
        description: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            owners,
            users,
            version: 0,
            description: description.into(),
            base: None,
            signature: None,
        }
    }

    /// Digest over the invariant fields. The signature is excluded, so
    /// signing does not change the id.
    pub fn id(&self) -> DarcId {
        let value = self.invariant_value();
        // Invariant fields hold no floats, the only canonical-encoding failure.
        canonical_digest(domains::DARC_ID, &value)
            .map(DarcId::from)
            .expect("darc fields are canonically encodable")
    }

    /// Id of the lineage this version belongs to.
    pub fn base_id(&self) -> DarcId {
        self.base.unwrap_or_else(|| self.id())
    }

    /// Whether `identity` is listed as an owner.
    pub fn is_owner(&self, identity: &Identity) -> bool {
        self.owners.contains(identity)
    }

    /// Whether `identity` is listed as a user.
    pub fn is_user(&self, identity: &Identity) -> bool {
        self.users.contains(identity)
    }

    /// The role `identity` holds here, owners first.
    pub fn role_of(&self, identity: &Identity) -> Option<Role> {
        if self.is_owner(identity) {
            Some(Role::Owner)
        } else if self.is_user(identity) {
            Some(Role::User)
        } else {
            None
        }
    }

    /// All members with their role, owners first.
    pub fn members(&self) -> impl Iterator<Item = (&Identity, Role)> {
        self.owners
            .iter()
            .map(|id| (id, Role::Owner))
            .chain(self.users.iter().map(|id| (id, Role::User)))
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(to_cbor(self)?)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        from_cbor(bytes).map_err(|e| DarcError::Serialization(e.to_string()))
    }

    fn invariant_value(&self) -> Value {
        let owners = self.owners.iter().map(Identity::to_cbor_value).collect();
        let users = self.users.iter().map(Identity::to_cbor_value).collect();
        let base = match &self.base {
            Some(id) => Value::Bytes(id.0.to_vec()),
            None => Value::Null,
        };

        Value::Map(vec![
            (Value::Integer(keys::OWNERS.into()), Value::Array(owners)),
            (Value::Integer(keys::USERS.into()), Value::Array(users)),
            (
                Value::Integer(keys::VERSION.into()),
                Value::Integer(self.version.into()),
            ),
            (
                Value::Integer(keys::DESCRIPTION.into()),
                Value::Bytes(self.description.clone()),
            ),
            (Value::Integer(keys::BASE.into()), base),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealchain_core::Keypair;

    fn key(seed: u8) -> Identity {
        Identity::PublicKey(Keypair::from_seed(&[seed; 32]).public_key())
    }

    #[test]
    fn test_id_ignores_signature() {
        let mut darc = Darc::genesis(vec![key(1)], vec![key(2)], b"doc".to_vec());
        let before = darc.id();

        darc.signature = Some(DarcSignature {
            signature: Ed25519Signature::ZERO,
            path: SignaturePath {
                chain: vec![],
                signer: key(1),
                role: Role::Owner,
            },
        });
        assert_eq!(darc.id(), before);
    }

    #[test]
    fn test_id_covers_invariant_fields() {
        let darc = Darc::genesis(vec![key(1)], vec![key(2)], b"doc".to_vec());

        let mut other = darc.clone();
        other.version = 1;
        assert_ne!(darc.id(), other.id());

        let mut other = darc.clone();
        other.users.push(key(3));
        assert_ne!(darc.id(), other.id());

        let mut other = darc.clone();
        other.description = b"changed".to_vec();
        assert_ne!(darc.id(), other.id());
    }

    #[test]
    fn test_base_id_of_genesis_is_own_id() {
        let darc = Darc::genesis(vec![key(1)], vec![], Vec::new());
        assert_eq!(darc.base_id(), darc.id());
    }

    #[test]
    fn test_role_of_prefers_owner() {
        let darc = Darc::genesis(vec![key(1)], vec![key(1), key(2)], Vec::new());
        assert_eq!(darc.role_of(&key(1)), Some(Role::Owner));
        assert_eq!(darc.role_of(&key(2)), Some(Role::User));
        assert_eq!(darc.role_of(&key(3)), None);
        assert_eq!(darc.members().count(), 3);
    }

    #[test]
    fn test_bytes_roundtrip_preserves_id() {
        let darc = Darc::genesis(vec![key(1), Identity::PolicyRef(DarcId::ZERO)], vec![], b"x".to_vec());
        let back = Darc::from_bytes(&darc.to_bytes().unwrap()).unwrap();
        assert_eq!(back.id(), darc.id());
    }
}
