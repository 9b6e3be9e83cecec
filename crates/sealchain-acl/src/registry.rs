//! The credential registry.
//!
//! A registry is an immutable snapshot of who holds which role. Mutations
//! return a new snapshot; the caller commits it to the ACL ledger and
//! only then replaces the snapshot it holds.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::error::{AclError, Result};

/// Capability held by a pseudonym.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Manages the registry.
    Admin,
    /// Stores documents.
    Writer,
    /// Requests documents.
    Reader,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Writer, Role::Reader];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Writer => "writer",
            Role::Reader => "reader",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials holding one role, keyed by pseudonym.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialList {
    entries: BTreeMap<String, Credential>,
}

impl CredentialList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pseudonym: &str) -> Option<&Credential> {
        self.entries.get(pseudonym)
    }

    pub fn contains(&self, pseudonym: &str) -> bool {
        self.entries.contains_key(pseudonym)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pseudonyms in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.entries.values()
    }

    fn insert(&mut self, credential: Credential) -> bool {
        if self.entries.contains_key(&credential.pseudonym) {
            return false;
        }
        self.entries.insert(credential.pseudonym.clone(), credential);
        true
    }

    fn remove(&mut self, pseudonym: &str) -> bool {
        self.entries.remove(pseudonym).is_some()
    }
}

/// Snapshot of the three role lists.
///
/// `version` counts the snapshots that changed something since the
/// registry was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRegistry {
    admins: CredentialList,
    writers: CredentialList,
    readers: CredentialList,
    version: u64,
}

impl CredentialRegistry {
    /// A registry whose only entry is `admin`.
    pub fn new(admin: Credential) -> Self {
        let mut admins = CredentialList::new();
        admins.insert(admin);
        Self {
            admins,
            writers: CredentialList::new(),
            readers: CredentialList::new(),
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn admins(&self) -> &CredentialList {
        &self.admins
    }

    pub fn writers(&self) -> &CredentialList {
        &self.writers
    }

    pub fn readers(&self) -> &CredentialList {
        &self.readers
    }

    pub fn list(&self, role: Role) -> &CredentialList {
        match role {
            Role::Admin => &self.admins,
            Role::Writer => &self.writers,
            Role::Reader => &self.readers,
        }
    }

    fn list_mut(&mut self, role: Role) -> &mut CredentialList {
        match role {
            Role::Admin => &mut self.admins,
            Role::Writer => &mut self.writers,
            Role::Reader => &mut self.readers,
        }
    }

    /// Add `credential` under `role`.
    ///
    /// If the pseudonym already holds the role the snapshot is returned
    /// unchanged, even when the keys differ.
    pub fn add_pseudonym(&self, role: Role, credential: Credential) -> Self {
        let mut next = self.clone();
        if next.list_mut(role).insert(credential) {
            next.version += 1;
        }
        next
    }

    /// Remove `pseudonym` from `role`.
    ///
    /// Removing the only admin, or a pseudonym that does not hold the role,
    /// leaves the snapshot unchanged.
    pub fn remove_pseudonym(&self, role: Role, pseudonym: &str) -> Self {
        let mut next = self.clone();
        if next.remove_one(role, pseudonym) {
            next.version += 1;
        }
        next
    }

    /// Remove `pseudonym` from every role, keeping the last admin.
    pub fn remove_everywhere(&self, pseudonym: &str) -> Self {
        let mut next = self.clone();
        let mut changed = false;
        for role in Role::ALL {
            changed |= next.remove_one(role, pseudonym);
        }
        if changed {
            next.version += 1;
        }
        next
    }

    fn remove_one(&mut self, role: Role, pseudonym: &str) -> bool {
        if role == Role::Admin && self.admins.len() == 1 && self.admins.contains(pseudonym) {
            return false;
        }
        self.list_mut(role).remove(pseudonym)
    }

    /// The credential `pseudonym` holds under `role`.
    pub fn find_pseudonym(&self, role: Role, pseudonym: &str) -> Result<&Credential> {
        self.list(role)
            .get(pseudonym)
            .ok_or_else(|| AclError::NotFound {
                role,
                pseudonym: pseudonym.to_string(),
            })
    }

    /// The credential registered for `pseudonym` under any role.
    pub fn credential_of(&self, pseudonym: &str) -> Option<&Credential> {
        Role::ALL
            .into_iter()
            .find_map(|role| self.list(role).get(pseudonym))
    }

    /// Roles held by `pseudonym`.
    pub fn roles_of(&self, pseudonym: &str) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.list(*role).contains(pseudonym))
            .collect()
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| AclError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| AclError::Serialization(e.to_string()))
    }
}
