//! Evolution, verification and signer resolution.
//!
//! Resolution walks policy references depth first. Every lineage entered
//! is recorded on the active path of a [`ResolveCtx`]; entering one that
//! is already active is a cycle, and the path length is bounded by
//! [`ResolverConfig::max_depth`]. Both checks happen before the source is
//! consulted, so resolution terminates on any reference graph.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, warn};

use sealchain_core::{DarcId, Ed25519PublicKey, Keypair};

use crate::darc::{Darc, DarcSignature, SignaturePath};
use crate::error::{DarcError, Result};
use crate::identity::{Identity, Role};
use crate::source::{DarcSource, DarcStore};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default bound on nested policy references.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Configuration for the resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum number of nested policy references on one resolution path.
    pub max_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// The active resolution path: lineages currently being resolved.
#[derive(Debug, Clone, Default)]
pub struct ResolveCtx {
    active: HashSet<DarcId>,
    depth: usize,
}

impl ResolveCtx {
    /// A context with nothing active.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lineages on the active path.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether `id` is on the active path.
    pub fn is_active(&self, id: &DarcId) -> bool {
        self.active.contains(id)
    }

    fn enter(&mut self, id: DarcId, max_depth: usize) -> Result<()> {
        if self.active.contains(&id) {
            warn!(darc = %id, depth = self.depth, "delegation cycle detected");
            return Err(DarcError::CycleDetected(id));
        }
        if self.depth >= max_depth {
            warn!(darc = %id, max_depth, "delegation depth exceeded");
            return Err(DarcError::DepthExceeded { max: max_depth });
        }
        self.active.insert(id);
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self, id: &DarcId) {
        if self.active.remove(id) {
            self.depth -= 1;
        }
    }
}

/// A signer reached from an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The signer's verification key.
    pub key: Ed25519PublicKey,

    /// Policy documents traversed, outermost first. Empty when the
    /// identity was the key itself.
    pub chain: Vec<Darc>,

    /// The signer's role in the last document of `chain`.
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Owners,
    Members,
}

impl Scope {
    fn admits(self, darc: &Darc, identity: &Identity) -> bool {
        match self {
            Scope::Owners => darc.is_owner(identity),
            Scope::Members => darc.role_of(identity).is_some(),
        }
    }
}

/// Evolves and verifies policy documents against a [`DarcSource`].
pub struct Resolver<'s, S: ?Sized> {
    source: &'s S,
    config: ResolverConfig,
}

impl<'s, S: DarcSource + ?Sized> Resolver<'s, S> {
    /// Create a resolver with default configuration.
    pub fn new(source: &'s S) -> Self {
        Self::with_config(source, ResolverConfig::default())
    }

    /// Create a resolver with explicit configuration.
    pub fn with_config(source: &'s S, config: ResolverConfig) -> Self {
        Self { source, config }
    }

    /// The active configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Build the next version of `prev`, signed by `signer`.
    ///
    /// The signer must be an owner of `prev`, directly or through the
    /// owners and users of policies it references.
    pub async fn evolve(
        &self,
        prev: &Darc,
        owners: Vec<Identity>,
        users: Vec<Identity>,
        description: impl Into<Vec<u8>>,
        signer: &Identity,
        secret: &Keypair,
    ) -> Result<Darc> {
        let signer_key = signer
            .as_public_key()
            .ok_or_else(|| DarcError::InvalidSigner("signer must be a public key".into()))?;
        if secret.public_key() != *signer_key {
            return Err(DarcError::InvalidSigner(
                "secret does not belong to signer".into(),
            ));
        }
        let version = prev.version.checked_add(1).ok_or(DarcError::VersionMismatch {
            expected: prev.version,
            got: prev.version,
        })?;

        let mut ctx = ResolveCtx::new();
        let found = match self.search(prev, Scope::Owners, signer_key, &mut ctx).await {
            Ok(found) => found,
            Err(e @ DarcError::Source(_)) => return Err(e),
            Err(e) => return Err(DarcError::InvalidSigner(e.to_string())),
        };

        let mut chain = Vec::with_capacity(found.chain.len() + 1);
        chain.push(prev.clone());
        chain.extend(found.chain);

        let mut next = Darc {
            owners,
            users,
            version,
            description: description.into(),
            base: Some(prev.base_id()),
            signature: None,
        };
        let signature = secret.sign(next.id().as_bytes());
        next.signature = Some(DarcSignature {
            signature,
            path: SignaturePath {
                chain,
                signer: signer.clone(),
                role: found.role.unwrap_or(Role::Owner),
            },
        });

        debug!(base = %next.base_id(), version, hops = next_hops(&next), "evolved darc");
        Ok(next)
    }

    /// Verify a single evolution step.
    ///
    /// Version 0 must be unsigned. Any other version must directly follow
    /// the first document of its signature path, which must be published,
    /// and be signed by an owner of it.
    pub async fn verify(&self, doc: &Darc) -> Result<()> {
        let mut ctx = ResolveCtx::new();
        self.verify_in(doc, &mut ctx).await
    }

    /// [`verify`](Self::verify) sharing an existing resolution path.
    pub fn verify_in<'a>(
        &'a self,
        doc: &'a Darc,
        ctx: &'a mut ResolveCtx,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if doc.version == 0 {
                if doc.base.is_some() {
                    return Err(DarcError::LineageMismatch);
                }
                if doc.signature.is_some() {
                    return Err(DarcError::BadSignature);
                }
                return Ok(());
            }

            let sig = doc.signature.as_ref().ok_or(DarcError::Unsigned)?;
            let prev = sig
                .path
                .chain
                .first()
                .ok_or_else(|| DarcError::UnknownSigner("signature path is empty".into()))?;

            if doc.base != Some(prev.base_id()) {
                return Err(DarcError::LineageMismatch);
            }
            if prev.version.checked_add(1) != Some(doc.version) {
                return Err(DarcError::VersionMismatch {
                    expected: prev.version.wrapping_add(1),
                    got: doc.version,
                });
            }
            let prev_id = prev.id();
            if self.source.get(&prev_id).await?.is_none() {
                return Err(DarcError::UnknownSigner(format!(
                    "predecessor {} is not published",
                    prev_id
                )));
            }

            let key = self.walk_path(&sig.path, ctx).await?;
            key.verify(doc.id().as_bytes(), &sig.signature)
                .map_err(|_| DarcError::BadSignature)
        })
    }

    /// Resolve `identity` to `signer`'s key.
    ///
    /// A key resolves to itself when it is the signer. A policy reference
    /// resolves through the latest version of the referenced lineage, which
    /// must verify, and then through its owners and users.
    pub fn resolve<'a>(
        &'a self,
        identity: &'a Identity,
        signer: &'a Ed25519PublicKey,
        ctx: &'a mut ResolveCtx,
    ) -> BoxFuture<'a, Result<Resolution>> {
        Box::pin(async move {
            match identity {
                Identity::PublicKey(pk) if pk == signer => Ok(Resolution {
                    key: *pk,
                    chain: Vec::new(),
                    role: None,
                }),
                Identity::PublicKey(pk) => Err(DarcError::UnknownSigner(format!(
                    "{:?} is not the signer",
                    pk
                ))),
                Identity::PolicyRef(base) => {
                    ctx.enter(*base, self.config.max_depth)?;
                    let result = self.resolve_entered(*base, signer, ctx).await;
                    ctx.leave(base);
                    result
                }
            }
        })
    }

    async fn resolve_entered(
        &self,
        base: DarcId,
        signer: &Ed25519PublicKey,
        ctx: &mut ResolveCtx,
    ) -> Result<Resolution> {
        let darc = self.fetch_latest(&base).await?;
        self.verify_in(&darc, ctx).await?;
        let found = self.search(&darc, Scope::Members, signer, ctx).await?;

        let mut chain = Vec::with_capacity(found.chain.len() + 1);
        chain.push(darc);
        chain.extend(found.chain);
        Ok(Resolution {
            key: found.key,
            chain,
            role: found.role,
        })
    }

    /// Find `signer` among the members of `darc` admitted by `scope`.
    ///
    /// Branches that merely do not contain the signer are skipped. If no
    /// branch succeeds, the first structural failure (cycle, depth, a
    /// reference that fails to verify) is reported over a plain miss.
    fn search<'a>(
        &'a self,
        darc: &'a Darc,
        scope: Scope,
        signer: &'a Ed25519PublicKey,
        ctx: &'a mut ResolveCtx,
    ) -> BoxFuture<'a, Result<Resolution>> {
        Box::pin(async move {
            let mut deferred: Option<DarcError> = None;

            for (member, role) in darc.members() {
                if scope == Scope::Owners && role != Role::Owner {
                    continue;
                }
                match self.resolve(member, signer, &mut *ctx).await {
                    Ok(mut found) => {
                        if found.role.is_none() {
                            found.role = Some(role);
                        }
                        return Ok(found);
                    }
                    Err(DarcError::UnknownSigner(_)) => {}
                    Err(e @ DarcError::Source(_)) => return Err(e),
                    Err(e) => {
                        deferred.get_or_insert(e);
                    }
                }
            }

            Err(deferred.unwrap_or_else(|| {
                DarcError::UnknownSigner(format!("signer not reachable from darc {}", darc.id()))
            }))
        })
    }

    /// Check every hop of a signature path and return the signer's key.
    async fn walk_path(&self, path: &SignaturePath, ctx: &mut ResolveCtx) -> Result<Ed25519PublicKey> {
        let (first, rest) = path
            .chain
            .split_first()
            .ok_or_else(|| DarcError::UnknownSigner("signature path is empty".into()))?;
        let mut current = first;
        let mut scope = Scope::Owners;

        for next in rest {
            let base = next.base_id();
            if !scope.admits(current, &Identity::PolicyRef(base)) {
                return Err(DarcError::UnknownSigner(format!(
                    "darc {} does not delegate to {}",
                    current.id(),
                    base
                )));
            }
            ctx.enter(base, self.config.max_depth)?;
            let result = self.check_hop(base, next, ctx).await;
            ctx.leave(&base);
            result?;

            current = next;
            scope = Scope::Members;
        }

        let key = path
            .signer
            .as_public_key()
            .ok_or_else(|| DarcError::UnknownSigner("signer must be a public key".into()))?;
        let held = match (scope, path.role) {
            (Scope::Owners, Role::Owner) | (Scope::Members, Role::Owner) => {
                current.is_owner(&path.signer)
            }
            (Scope::Members, Role::User) => current.is_user(&path.signer),
            (Scope::Owners, Role::User) => false,
        };
        if !held {
            return Err(DarcError::UnknownSigner(format!(
                "{:?} is not {:?} of darc {}",
                key,
                path.role,
                current.id()
            )));
        }
        Ok(*key)
    }

    /// A path hop must be the latest version of its lineage, and verify.
    fn check_hop<'a>(
        &'a self,
        base: DarcId,
        embedded: &'a Darc,
        ctx: &'a mut ResolveCtx,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let latest = self.fetch_latest(&base).await?;
            if latest.id() != embedded.id() {
                return Err(DarcError::UnknownSigner(format!(
                    "path uses a stale version of darc {}",
                    base
                )));
            }
            self.verify_in(&latest, ctx).await
        })
    }

    async fn fetch_latest(&self, base: &DarcId) -> Result<Darc> {
        self.source
            .latest(base)
            .await?
            .ok_or(DarcError::NotFound(*base))
    }
}

impl<'s, S: DarcStore + ?Sized> Resolver<'s, S> {
    /// Verify `darc` and append it to its lineage.
    ///
    /// A new version must extend the latest published one; anything else
    /// is stale. Publishing an already known genesis is a no-op.
    pub async fn publish(&self, darc: Darc) -> Result<DarcId> {
        let id = darc.id();

        if darc.version == 0 {
            if self.source.get(&id).await?.is_some() {
                return Ok(id);
            }
        } else {
            let latest = self.fetch_latest(&darc.base_id()).await?;
            let extends_latest = darc
                .signature
                .as_ref()
                .and_then(|sig| sig.path.chain.first())
                .map(|prev| prev.id() == latest.id())
                .unwrap_or(false);
            if latest.version.checked_add(1) != Some(darc.version) || !extends_latest {
                return Err(DarcError::VersionMismatch {
                    expected: latest.version.wrapping_add(1),
                    got: darc.version,
                });
            }
        }

        self.verify(&darc).await?;
        self.source.store(darc).await?;
        debug!(darc = %id, "published darc");
        Ok(id)
    }
}

fn next_hops(darc: &Darc) -> usize {
    darc.signature
        .as_ref()
        .map(|sig| sig.path.chain.len().saturating_sub(1))
        .unwrap_or(0)
}
