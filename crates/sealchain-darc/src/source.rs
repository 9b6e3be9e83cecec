//! Where policy documents are looked up during resolution.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use sealchain_core::DarcId;

use crate::darc::Darc;
use crate::error::{DarcError, Result};

/// Read access to published policy documents.
#[async_trait]
pub trait DarcSource: Send + Sync {
    /// The latest published version of the lineage `base`.
    async fn latest(&self, base: &DarcId) -> Result<Option<Darc>>;

    /// A specific published version, by id.
    async fn get(&self, id: &DarcId) -> Result<Option<Darc>>;
}

/// A source that also accepts new versions.
///
/// Implementations store what they are given; use
/// [`Resolver::publish`](crate::Resolver::publish) to verify first.
#[async_trait]
pub trait DarcStore: DarcSource {
    /// Append a version to its lineage.
    async fn store(&self, darc: Darc) -> Result<()>;
}

/// In-memory policy store. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryDarcStore {
    inner: RwLock<MemoryDarcInner>,
}

#[derive(Default)]
struct MemoryDarcInner {
    /// Versions of each lineage, oldest first.
    lineages: HashMap<DarcId, Vec<Darc>>,

    /// Every version by id.
    by_id: HashMap<DarcId, Darc>,
}

impl MemoryDarcStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored versions across all lineages.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.by_id.len()).unwrap_or(0)
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> DarcError {
    DarcError::Source("darc store lock poisoned".into())
}

#[async_trait]
impl DarcSource for MemoryDarcStore {
    async fn latest(&self, base: &DarcId) -> Result<Option<Darc>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .lineages
            .get(base)
            .and_then(|versions| versions.last())
            .cloned())
    }

    async fn get(&self, id: &DarcId) -> Result<Option<Darc>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.by_id.get(id).cloned())
    }
}

#[async_trait]
impl DarcStore for MemoryDarcStore {
    async fn store(&self, darc: Darc) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let id = darc.id();
        inner
            .lineages
            .entry(darc.base_id())
            .or_default()
            .push(darc.clone());
        inner.by_id.insert(id, darc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use sealchain_core::Keypair;

    #[tokio::test]
    async fn test_latest_tracks_lineage() {
        let store = MemoryDarcStore::new();
        let owner = Identity::PublicKey(Keypair::generate().public_key());

        let v0 = Darc::genesis(vec![owner.clone()], vec![], b"v0".to_vec());
        let mut v1 = v0.clone();
        v1.version = 1;
        v1.base = Some(v0.id());

        store.store(v0.clone()).await.unwrap();
        assert_eq!(store.latest(&v0.id()).await.unwrap(), Some(v0.clone()));

        store.store(v1.clone()).await.unwrap();
        assert_eq!(store.latest(&v0.id()).await.unwrap(), Some(v1.clone()));
        assert_eq!(store.get(&v0.id()).await.unwrap(), Some(v0));
        assert_eq!(store.get(&v1.id()).await.unwrap(), Some(v1));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_lineage() {
        let store = MemoryDarcStore::new();
        assert!(store.is_empty());
        assert_eq!(store.latest(&DarcId::ZERO).await.unwrap(), None);
    }
}
