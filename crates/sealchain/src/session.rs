//! The authorization protocol session.
//!
//! A [`Session`] owns the tips of two chains: the ACL chain, whose blocks are
//! successive [`CredentialRegistry`] snapshots, and the data chain, whose
//! blocks are [`DataBlock`]s. Tips advance only when a commit succeeds, so a
//! failed operation leaves the session exactly as it was.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use sealchain_acl::{Credential, CredentialKeys, CredentialRegistry, Role};
use sealchain_core::{BlockRef, ChainRef, Roster};
use sealchain_crypto::{EncryptedPayload, EncryptionKey, SealedKey};
use sealchain_ledger::{Authorization, Ledger, LedgerError};

use crate::config::{ReadAuditPolicy, SessionConfig};
use crate::error::{ProtocolError, Result};
use crate::records::{DataBlock, FileContents, FileRequestToken, ReadRequest, RecordRef, WriteRecord};
use crate::service::ThresholdCryptoService;

const SNAPSHOT_MAGIC: &str = "sealchain-session";
const SNAPSHOT_FORMAT: u32 = 1;

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No chains yet. Only passed through inside [`Session::bootstrap`].
    Created,
    /// The ACL chain holds the registry; no document has been written.
    AclEstablished,
    /// At least one document has been written.
    Operational,
}

/// A registry mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOp {
    Add,
    Remove,
}

struct AclState {
    latest: BlockRef,
    registry: CredentialRegistry,
    keyring: BTreeMap<String, CredentialKeys>,
}

impl AclState {
    /// Keys held for `name` that match its registered `credential`.
    fn keys_for(&self, name: &str, credential: &Credential) -> Result<CredentialKeys> {
        match self.keyring.get(name) {
            Some(keys) if keys.credential(name) == *credential => Ok(keys.clone()),
            _ => Err(ProtocolError::UnknownUser(name.to_string())),
        }
    }
}

struct DataState {
    latest: BlockRef,
    operational: bool,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    magic: String,
    format: u32,
    acl_chain: ChainRef,
    data_chain: ChainRef,
    latest_acl: BlockRef,
    latest_data: BlockRef,
    registry: CredentialRegistry,
    admin: Credential,
    keyring: BTreeMap<String, CredentialKeys>,
    operational: bool,
}

/// One client's view of the two ledgers.
///
/// Commits to the same chain are serialized through that chain's lock; the
/// ACL and data chains proceed independently. When both locks are needed the
/// ACL lock is taken first.
pub struct Session {
    ledger: Arc<dyn Ledger>,
    crypto: Arc<dyn ThresholdCryptoService>,
    config: SessionConfig,
    acl_chain: ChainRef,
    data_chain: ChainRef,
    admin: Credential,
    acl: Mutex<AclState>,
    data: Mutex<DataState>,
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProtocolError::Validation {
            field: "pseudonym",
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

fn registry_payload(registry: &CredentialRegistry) -> Result<Bytes> {
    Ok(Bytes::from(registry.to_bytes()?))
}

impl Session {
    /// Create both chains and a registry whose only admin is `admin_name`.
    pub async fn bootstrap(
        roster: &Roster,
        admin_name: &str,
        ledger: Arc<dyn Ledger>,
        crypto: Arc<dyn ThresholdCryptoService>,
        config: SessionConfig,
    ) -> Result<Self> {
        check_name(admin_name)?;
        debug!(state = ?SessionState::Created, admin = admin_name, "bootstrapping session");

        let admin_keys = CredentialKeys::generate();
        let admin = admin_keys.credential(admin_name);
        let registry = CredentialRegistry::new(admin.clone());

        let acl_chain = ledger
            .create_chain(roster, registry_payload(&registry)?)
            .await?;
        debug!(state = ?SessionState::AclEstablished, %acl_chain, "ACL chain created");

        let data_chain = ledger
            .create_chain(roster, DataBlock::Genesis.to_bytes()?)
            .await?;

        let latest_acl = ledger.get_latest(&acl_chain).await?;
        let latest_data = ledger.get_latest(&data_chain).await?;

        let mut keyring = BTreeMap::new();
        keyring.insert(admin_name.to_string(), admin_keys);

        info!(%acl_chain, %data_chain, admin = admin_name, "session bootstrapped");

        Ok(Self {
            ledger,
            crypto,
            config,
            acl_chain,
            data_chain,
            admin,
            acl: Mutex::new(AclState {
                latest: latest_acl,
                registry,
                keyring,
            }),
            data: Mutex::new(DataState {
                latest: latest_data,
                operational: false,
            }),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// The chain holding registry snapshots.
    pub fn acl_chain(&self) -> ChainRef {
        self.acl_chain
    }

    /// The chain holding documents and read requests.
    pub fn data_chain(&self) -> ChainRef {
        self.data_chain
    }

    /// The credential that signs every ACL block.
    pub fn admin(&self) -> &Credential {
        &self.admin
    }

    /// Configuration this session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        if self.data.lock().await.operational {
            SessionState::Operational
        } else {
            SessionState::AclEstablished
        }
    }

    /// The last committed registry snapshot.
    pub async fn registry(&self) -> CredentialRegistry {
        self.acl.lock().await.registry.clone()
    }

    /// This session's view of the ACL chain tip.
    pub async fn latest_acl(&self) -> BlockRef {
        self.acl.lock().await.latest
    }

    /// This session's view of the data chain tip.
    pub async fn latest_data(&self) -> BlockRef {
        self.data.lock().await.latest
    }

    /// Secret keys this session holds for `name`.
    pub async fn keys(&self, name: &str) -> Result<CredentialKeys> {
        self.acl
            .lock()
            .await
            .keyring
            .get(name)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownUser(name.to_string()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry management
    // ─────────────────────────────────────────────────────────────────────────

    /// Add `name` to or remove it from `role`, committing the resulting
    /// snapshot as the next ACL block.
    ///
    /// Every successful call appends exactly one block, even when the
    /// snapshot is unchanged (removing the last admin, adding a role that is
    /// already held). A new pseudonym gets freshly generated keys; a known one
    /// keeps its keys across roles. Adding a pseudonym that is registered
    /// but whose keys this session does not hold fails with `UnknownUser`.
    pub async fn manage_user(&self, op: UserOp, name: &str, role: Role) -> Result<BlockRef> {
        check_name(name)?;
        let mut acl = self.acl.lock().await;

        let (registry, added) = match op {
            UserOp::Add => {
                let keys = match acl.registry.credential_of(name) {
                    Some(registered) => acl.keys_for(name, registered)?,
                    None => CredentialKeys::generate(),
                };
                let credential = keys.credential(name);
                (acl.registry.add_pseudonym(role, credential), Some(keys))
            }
            UserOp::Remove => (acl.registry.remove_pseudonym(role, name), None),
        };

        let latest = self.commit_acl(&acl, &registry).await?;

        acl.latest = latest;
        acl.registry = registry;
        match added {
            Some(keys) => {
                acl.keyring.insert(name.to_string(), keys);
            }
            None => self.prune_keyring(&mut acl, name),
        }

        info!(?op, user = name, %role, version = acl.registry.version(), block = %latest, "registry updated");
        Ok(latest)
    }

    /// Remove `name` from every role in one committed snapshot.
    pub async fn remove_user(&self, name: &str) -> Result<BlockRef> {
        check_name(name)?;
        let mut acl = self.acl.lock().await;

        let registry = acl.registry.remove_everywhere(name);
        let latest = self.commit_acl(&acl, &registry).await?;

        acl.latest = latest;
        acl.registry = registry;
        self.prune_keyring(&mut acl, name);

        info!(user = name, version = acl.registry.version(), block = %latest, "user removed");
        Ok(latest)
    }

    /// Forget the keys of a pseudonym that holds no role. The session admin
    /// keeps its keys: they sign every ACL block.
    fn prune_keyring(&self, acl: &mut AclState, name: &str) {
        if name != self.admin.pseudonym && acl.registry.roles_of(name).is_empty() {
            acl.keyring.remove(name);
        }
    }

    async fn commit_acl(&self, acl: &AclState, registry: &CredentialRegistry) -> Result<BlockRef> {
        let admin_keys = acl
            .keyring
            .get(&self.admin.pseudonym)
            .ok_or_else(|| ProtocolError::UnknownUser(self.admin.pseudonym.clone()))?;

        let payload = registry_payload(registry)?;
        let authorization = Authorization::sign(&admin_keys.signing(), &acl.latest, &payload);
        let block = self
            .ledger
            .commit_block(&self.acl_chain, &acl.latest, payload, Some(authorization))
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    warn!(chain = %self.acl_chain, error = %e, "ACL commit rejected");
                }
                ProtocolError::from(e)
            })?;
        Ok(block)
    }

    /// Re-read both tips and the registry from the ledger.
    ///
    /// The recovery step after a `CommitConflict`. Keys held for pseudonyms
    /// that no longer appear in the registry, or that no longer match the
    /// registered credential, are dropped. The admin's keys are kept.
    pub async fn refresh(&self) -> Result<()> {
        let mut acl = self.acl.lock().await;
        let mut data = self.data.lock().await;

        let latest_acl = self.ledger.get_latest(&self.acl_chain).await?;
        let block = self.ledger.get_block(&self.acl_chain, &latest_acl).await?;
        let registry = CredentialRegistry::from_bytes(&block.payload)?;
        let latest_data = self.ledger.get_latest(&self.data_chain).await?;

        let keyring = std::mem::take(&mut acl.keyring)
            .into_iter()
            .filter(|(name, keys)| {
                *name == self.admin.pseudonym
                    || registry
                        .credential_of(name)
                        .is_some_and(|registered| keys.credential(name.as_str()) == *registered)
            })
            .collect();
        acl.latest = latest_acl;
        acl.registry = registry;
        acl.keyring = keyring;
        data.latest = latest_data;

        debug!(acl = %latest_acl, data = %latest_data, version = acl.registry.version(), "session refreshed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────

    /// Seal a document key to the data chain's roster.
    ///
    /// Touches neither ledger.
    pub async fn request_encryption_target(&self, key: &EncryptionKey) -> Result<SealedKey> {
        let roster = self.ledger.roster(&self.data_chain).await?;
        Ok(self.crypto.encrypt_under_shared_key(key, &roster).await?)
    }

    /// Store an encrypted document written by `writer`.
    ///
    /// Returns the new data block, which is the document's id.
    pub async fn write_file(
        &self,
        encrypted_data: EncryptedPayload,
        encrypted_key: SealedKey,
        writer: &str,
    ) -> Result<BlockRef> {
        let (credential, keys) = {
            let acl = self.acl.lock().await;
            let credential = acl
                .registry
                .writers()
                .get(writer)
                .cloned()
                .ok_or_else(|| ProtocolError::UnauthorizedWriter(writer.to_string()))?;
            let keys = acl.keys_for(writer, &credential)?;
            (credential, keys)
        };

        let payload = DataBlock::Write(WriteRecord {
            encrypted_data,
            encrypted_key,
            writer: credential,
        })
        .to_bytes()?;

        let mut data = self.data.lock().await;
        let file = self.commit_data(&data.latest, payload, &keys).await?;
        data.latest = file;
        if !data.operational {
            data.operational = true;
            debug!(state = ?SessionState::Operational, "first document written");
        }

        info!(writer, %file, "document stored");
        Ok(file)
    }

    /// Record a read request for `file` by `reader` and issue a token for it.
    ///
    /// The committed block is fetched back and checked against the reader's
    /// registered key. If it does not match, the block stays on the ledger but
    /// no token is issued.
    pub async fn request_read(&self, file: &BlockRef, reader: &str) -> Result<FileRequestToken> {
        let acl = self.acl.lock().await;
        let Some(credential) = acl.registry.readers().get(reader).cloned() else {
            let admin_keys = acl.keyring.get(&self.admin.pseudonym).cloned();
            drop(acl);
            return Err(self.deny_read(file, reader, admin_keys).await);
        };
        let keys = acl.keys_for(reader, &credential)?;
        drop(acl);

        let mut data = self.data.lock().await;
        self.fetch_write_record(file).await?;

        let request = ReadRequest::sign(*file, reader, &keys);
        let payload = DataBlock::Read(request).to_bytes()?;
        let record = self.commit_data(&data.latest, payload, &keys).await?;
        data.latest = record;
        drop(data);

        let committed = self.ledger.get_block(&self.data_chain, &record).await?;
        let intact = match DataBlock::from_bytes(&committed.payload) {
            Ok(DataBlock::Read(request)) => request.file == *file && request.verify(&credential).is_ok(),
            _ => false,
        };
        if !intact {
            warn!(reader, %record, "committed read request does not match the signed request");
            return Err(ProtocolError::ForgedRequest(record));
        }

        debug!(reader, %file, %record, "read request recorded");
        Ok(FileRequestToken::issue(*file, record, credential))
    }

    /// Refuse `reader`, recording the attempt when the audit policy asks for it.
    ///
    /// The refusal is returned even when the audit block cannot be committed.
    async fn deny_read(
        &self,
        file: &BlockRef,
        reader: &str,
        admin_keys: Option<CredentialKeys>,
    ) -> ProtocolError {
        let denied = ProtocolError::UnauthorizedReader(reader.to_string());
        if self.config.read_audit != ReadAuditPolicy::RecordDenials {
            debug!(reader, %file, "read refused");
            return denied;
        }

        let Some(admin_keys) = admin_keys else {
            warn!(reader, %file, "refused read not recorded: admin keys missing");
            return denied;
        };
        let payload = match (DataBlock::DeniedRead {
            file: *file,
            pseudonym: reader.to_string(),
        })
        .to_bytes()
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(reader, %file, error = %e, "refused read not recorded");
                return denied;
            }
        };

        let mut data = self.data.lock().await;
        match self.commit_data(&data.latest, payload, &admin_keys).await {
            Ok(block) => {
                data.latest = block;
                info!(reader, %file, %block, "refused read recorded");
            }
            Err(e) => warn!(reader, %file, error = %e, "refused read not recorded"),
        }
        denied
    }

    /// Fetch a stored document and have its key re-encrypted for the token's
    /// reader.
    pub async fn read_file(&self, token: &FileRequestToken) -> Result<FileContents> {
        if !token.is_intact() {
            return Err(ProtocolError::Validation {
                field: "handle",
                reason: "token fields do not match its handle".into(),
            });
        }

        let record = self.fetch_write_record(&token.file_id).await?;
        let read_record = RecordRef {
            chain: self.data_chain,
            block: token.read_record_id,
        };
        let key = self
            .crypto
            .re_encrypt_for_reader(&record.encrypted_key, &read_record, &token.credential)
            .await?;

        debug!(reader = %token.credential.pseudonym, file = %token.file_id, "document released");
        Ok(FileContents {
            ciphertext: record.encrypted_data,
            key,
            read_record_id: token.read_record_id,
        })
    }

    /// Committed read requests, oldest first.
    ///
    /// Starts at `start` (inclusive) or at the genesis block, and returns at
    /// most `count` entries up to this session's data tip.
    pub async fn read_requests(
        &self,
        start: Option<BlockRef>,
        count: usize,
    ) -> Result<Vec<(BlockRef, ReadRequest)>> {
        let tip = self.data.lock().await.latest;
        let last = self.ledger.get_block(&self.data_chain, &tip).await?.index;
        let first = match start {
            Some(block) => self.ledger.get_block(&self.data_chain, &block).await?.index,
            None => 0,
        };

        let mut requests = Vec::new();
        let mut index = first;
        while index <= last && requests.len() < count {
            let block = self.ledger.get_block_at(&self.data_chain, index).await?;
            if let DataBlock::Read(request) = DataBlock::from_bytes(&block.payload)? {
                requests.push((block.hash, request));
            }
            index += 1;
        }
        Ok(requests)
    }

    async fn fetch_write_record(&self, file: &BlockRef) -> Result<WriteRecord> {
        let block = match self.ledger.get_block(&self.data_chain, file).await {
            Ok(block) => block,
            Err(LedgerError::NotFound(_)) => return Err(ProtocolError::FileNotFound(*file)),
            Err(e) => return Err(e.into()),
        };
        match DataBlock::from_bytes(&block.payload)? {
            DataBlock::Write(record) => Ok(record),
            _ => Err(ProtocolError::FileNotFound(*file)),
        }
    }

    async fn commit_data(&self, parent: &BlockRef, payload: Bytes, keys: &CredentialKeys) -> Result<BlockRef> {
        let authorization = Authorization::sign(&keys.signing(), parent, &payload);
        let block = self
            .ledger
            .commit_block(&self.data_chain, parent, payload, Some(authorization))
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    warn!(chain = %self.data_chain, error = %e, "data commit rejected");
                }
                ProtocolError::from(e)
            })?;
        Ok(block)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Marshal
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize the session: chain references, tips, the registry, the
    /// admin credential and the keyring. Block payloads are not included.
    pub async fn to_bytes(&self) -> Result<Vec<u8>> {
        let acl = self.acl.lock().await;
        let data = self.data.lock().await;
        let snapshot = Snapshot {
            magic: SNAPSHOT_MAGIC.to_string(),
            format: SNAPSHOT_FORMAT,
            acl_chain: self.acl_chain,
            data_chain: self.data_chain,
            latest_acl: acl.latest,
            latest_data: data.latest,
            registry: acl.registry.clone(),
            admin: self.admin.clone(),
            keyring: acl.keyring.clone(),
            operational: data.operational,
        };

        let mut buf = Vec::new();
        ciborium::into_writer(&snapshot, &mut buf).map_err(|e| ProtocolError::Marshal(e.to_string()))?;
        Ok(buf)
    }

    /// Rebuild a session from [`Session::to_bytes`] output, bound to the
    /// given collaborators.
    pub fn from_bytes(
        bytes: &[u8],
        ledger: Arc<dyn Ledger>,
        crypto: Arc<dyn ThresholdCryptoService>,
        config: SessionConfig,
    ) -> Result<Self> {
        let snapshot: Snapshot =
            ciborium::from_reader(bytes).map_err(|e| ProtocolError::Unmarshal(e.to_string()))?;

        if snapshot.magic != SNAPSHOT_MAGIC {
            return Err(ProtocolError::Unmarshal("not a session snapshot".into()));
        }
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(ProtocolError::Unmarshal(format!(
                "unsupported snapshot format {}",
                snapshot.format
            )));
        }
        match snapshot.keyring.get(&snapshot.admin.pseudonym) {
            Some(keys) if keys.credential(snapshot.admin.pseudonym.as_str()) == snapshot.admin => {}
            _ => return Err(ProtocolError::Unmarshal("admin keys missing".into())),
        }

        Ok(Self {
            ledger,
            crypto,
            config,
            acl_chain: snapshot.acl_chain,
            data_chain: snapshot.data_chain,
            admin: snapshot.admin,
            acl: Mutex::new(AclState {
                latest: snapshot.latest_acl,
                registry: snapshot.registry,
                keyring: snapshot.keyring,
            }),
            data: Mutex::new(DataState {
                latest: snapshot.latest_data,
                operational: snapshot.operational,
            }),
        })
    }
}
