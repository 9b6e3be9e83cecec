//! Strong type definitions for Sealchain.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Blake3Hash, Ed25519PublicKey};

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Create from raw bytes.
            pub const fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }

            /// Get the raw bytes.
            pub const fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Convert to hex string.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse from hex string.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// The zero identifier (sentinel).
            pub const ZERO: Self = Self([0u8; 32]);
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..16])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", &self.to_hex()[..16])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl From<Blake3Hash> for $name {
            fn from(hash: Blake3Hash) -> Self {
                Self(hash.0)
            }
        }
    };
}

hash_id!(
    /// Content hash of a ledger block.
    ///
    /// Also serves as the identifier of a stored file (the hash of the block
    /// holding its write record) and of a read record.
    BlockRef
);

hash_id!(
    /// Identifier of a ledger chain: the content hash of its genesis block.
    ChainRef
);

hash_id!(
    /// Identifier of a policy document version: a digest over its
    /// invariant fields. The id of version 0 names the whole lineage.
    DarcId
);

impl From<ChainRef> for BlockRef {
    fn from(chain: ChainRef) -> Self {
        Self(chain.0)
    }
}

/// A node allowed to extend a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Network address; opaque to the core.
    pub address: String,

    /// The node's public key.
    pub public: Ed25519PublicKey,
}

/// The set of nodes authorized to extend a ledger and holding the shares of
/// its threshold key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub nodes: Vec<ServerIdentity>,
}

impl Roster {
    /// Build a roster from its nodes.
    pub fn new(nodes: Vec<ServerIdentity>) -> Self {
        Self { nodes }
    }

    /// Stable identifier of this roster.
    pub fn id(&self) -> Blake3Hash {
        let mut hasher = blake3::Hasher::new_derive_key("sealchain-v0-roster");
        for node in &self.nodes {
            hasher.update(node.public.as_bytes());
            hasher.update(&(node.address.len() as u64).to_be_bytes());
            hasher.update(node.address.as_bytes());
        }
        Blake3Hash(*hasher.finalize().as_bytes())
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the roster has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
