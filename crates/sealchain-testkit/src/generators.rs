//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sealchain::{Role, UserOp};
use sealchain_acl::CredentialKeys;
use sealchain_core::{BlockRef, Keypair};
use sealchain_darc::{Darc, Identity, MemoryDarcStore, Resolver};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate credential secrets.
pub fn credential_keys() -> impl Strategy<Value = CredentialKeys> {
    any::<[u8; 32]>().prop_map(CredentialKeys::from_seed)
}

/// Generate a random BlockRef.
pub fn block_ref() -> impl Strategy<Value = BlockRef> {
    any::<[u8; 32]>().prop_map(BlockRef::from_bytes)
}

/// Generate a pseudonym from a small pool, so operations collide.
pub fn pseudonym() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("alice".to_string()),
        Just("bob".to_string()),
        Just("carol".to_string()),
        Just("dave".to_string()),
    ]
}

/// Generate a registry role.
pub fn role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::Admin), Just(Role::Writer), Just(Role::Reader)]
}

/// Generate a registry mutation.
pub fn user_op() -> impl Strategy<Value = (UserOp, String, Role)> {
    (
        prop_oneof![Just(UserOp::Add), Just(UserOp::Remove)],
        pseudonym(),
        role(),
    )
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Parameters for a policy evolution chain.
///
/// Version `i + 1` is owned by `owners[i]` and signed by the owner of
/// version `i`, so ownership rotates along the chain.
#[derive(Debug, Clone)]
pub struct EvolutionParams {
    pub genesis_owner: [u8; 32],
    pub owners: Vec<[u8; 32]>,
    pub descriptions: Vec<Vec<u8>>,
}

impl Arbitrary for EvolutionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), prop::collection::vec(any::<[u8; 32]>(), 0..6))
            .prop_flat_map(|(genesis_owner, owners)| {
                let len = owners.len();
                (
                    Just(genesis_owner),
                    Just(owners),
                    prop::collection::vec(payload(32), len),
                )
            })
            .prop_map(|(genesis_owner, owners, descriptions)| EvolutionParams {
                genesis_owner,
                owners,
                descriptions,
            })
            .boxed()
    }
}

/// Build and publish the chain described by `params`.
///
/// Returns the store holding every version and the versions in order.
pub fn evolution_chain(params: &EvolutionParams) -> (MemoryDarcStore, Vec<Darc>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("test runtime");
    runtime.block_on(async {
        let store = MemoryDarcStore::new();
        let resolver = Resolver::new(&store);

        let mut secret = Keypair::from_seed(&params.genesis_owner);
        let genesis = Darc::genesis(vec![Identity::PublicKey(secret.public_key())], vec![], Vec::new());
        resolver.publish(genesis.clone()).await.expect("publish genesis");

        let mut chain = vec![genesis];
        for (seed, description) in params.owners.iter().zip(&params.descriptions) {
            let next_secret = Keypair::from_seed(seed);
            let prev = chain.last().expect("chain starts with genesis");
            let signer = Identity::PublicKey(secret.public_key());
            let next = resolver
                .evolve(
                    prev,
                    vec![Identity::PublicKey(next_secret.public_key())],
                    vec![],
                    description.clone(),
                    &signer,
                    &secret,
                )
                .await
                .expect("evolve by current owner");
            resolver.publish(next.clone()).await.expect("publish next version");
            chain.push(next);
            secret = next_secret;
        }
        (store, chain)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealchain_darc::DarcSource;

    fn verify_all(store: &MemoryDarcStore, chain: &[Darc]) -> Vec<bool> {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let resolver = Resolver::new(store);
            let mut results = Vec::new();
            for darc in chain {
                results.push(resolver.verify(darc).await.is_ok());
            }
            results
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_evolution_chain_verifies(params: EvolutionParams) {
            let (store, chain) = evolution_chain(&params);

            prop_assert_eq!(chain.len(), params.owners.len() + 1);
            for (i, darc) in chain.iter().enumerate() {
                prop_assert_eq!(darc.version as usize, i);
                prop_assert_eq!(darc.base_id(), chain[0].id());
            }
            prop_assert!(verify_all(&store, &chain).into_iter().all(|ok| ok));

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let latest = runtime.block_on(store.latest(&chain[0].id())).unwrap();
            prop_assert_eq!(latest.as_ref(), chain.last());
        }

        #[test]
        fn test_skipped_version_fails(params: EvolutionParams) {
            prop_assume!(!params.owners.is_empty());
            let (store, chain) = evolution_chain(&params);

            let mut skipped = chain[1].clone();
            skipped.version += 1;
            prop_assert_eq!(verify_all(&store, &[skipped]), vec![false]);
        }
    }
}
