//! End-to-end behavior of a session over in-memory collaborators.

use proptest::prelude::*;

use sealchain::core::BlockRef;
use sealchain::crypto::EncryptedPayload;
use sealchain::ledger::Ledger;
use sealchain::{
    DataBlock, ErrorKind, FileRequestToken, ProtocolError, ReadAuditPolicy, ReencryptionHandle,
    Role, Session, SessionConfig, SessionState, UserOp,
};
use sealchain_testkit::generators::user_op;
use sealchain_testkit::TestEnv;

async fn invoice_env() -> (TestEnv, BlockRef) {
    let env = TestEnv::bootstrap("alice").await;
    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    env.session.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap();
    let file = env.store_document("bob", b"invoice").await.unwrap();
    (env, file)
}

#[tokio::test]
async fn test_invoice_scenario() {
    let (env, file) = invoice_env().await;

    let token = env.session.request_read(&file, "carol").await.unwrap();
    assert_eq!(token.file_id, file);
    assert_eq!(token.credential.pseudonym, "carol");

    let contents = env.session.read_file(&token).await.unwrap();
    let keys = env.session.keys("carol").await.unwrap();
    assert_eq!(contents.decrypt(&keys).unwrap(), b"invoice");

    let err = env.session.request_read(&file, "dave").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnauthorizedReader(ref name) if name == "dave"));
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_non_writer_leaves_tip_unchanged() {
    let (env, _) = invoice_env().await;
    let tip = env.session.latest_data().await;
    let height = env.ledger.height(&env.session.data_chain());

    let err = env.store_document("carol", b"forged invoice").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnauthorizedWriter(_)));
    let err = env.store_document("mallory", b"forged invoice").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnauthorizedWriter(_)));

    assert_eq!(env.session.latest_data().await, tip);
    assert_eq!(env.ledger.height(&env.session.data_chain()), height);
}

#[tokio::test]
async fn test_removing_last_admin_is_noop() {
    let env = TestEnv::bootstrap("alice").await;
    let before = env.session.registry().await;

    env.session.manage_user(UserOp::Remove, "alice", Role::Admin).await.unwrap();
    env.session.remove_user("alice").await.unwrap();

    let after = env.session.registry().await;
    assert_eq!(after.admins(), before.admins());
    assert!(env.session.keys("alice").await.is_ok());

    // With a second admin the first can leave.
    env.session.manage_user(UserOp::Add, "bob", Role::Admin).await.unwrap();
    env.session.manage_user(UserOp::Remove, "alice", Role::Admin).await.unwrap();
    let admins: Vec<_> = env.session.registry().await.admins().names().map(String::from).collect();
    assert_eq!(admins, vec!["bob".to_string()]);
}

#[tokio::test]
async fn test_revoked_reader_gets_no_token() {
    let (env, file) = invoice_env().await;
    env.session.manage_user(UserOp::Remove, "carol", Role::Reader).await.unwrap();

    let err = env.session.request_read(&file, "carol").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnauthorizedReader(_)));
}

#[tokio::test]
async fn test_duplicate_reads_yield_independent_tokens() {
    let (env, file) = invoice_env().await;

    let first = env.session.request_read(&file, "carol").await.unwrap();
    let second = env.session.request_read(&file, "carol").await.unwrap();
    assert_ne!(first.read_record_id, second.read_record_id);

    for token in [first, second] {
        let contents = env.session.read_file(&token).await.unwrap();
        let keys = env.session.keys("carol").await.unwrap();
        assert_eq!(contents.decrypt(&keys).unwrap(), b"invoice");
    }
}

#[tokio::test]
async fn test_edited_token_is_rejected() {
    let (env, file) = invoice_env().await;
    let token = env.session.request_read(&file, "carol").await.unwrap();

    let mut edited = token.clone();
    edited.read_record_id = file;
    let err = env.session.read_file(&edited).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Validation { field: "handle", .. }));
}

#[tokio::test]
async fn test_service_refuses_token_without_read_record() {
    let (env, file) = invoice_env().await;
    let carol = env.session.registry().await.readers().get("carol").cloned().unwrap();

    // A self-consistent token pointing at the write block instead of a read request.
    let token = FileRequestToken {
        file_id: file,
        read_record_id: file,
        handle: ReencryptionHandle::bind(&file, &file, &carol),
        credential: carol,
    };
    assert!(token.is_intact());

    let err = env.session.read_file(&token).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ReencryptionRefused(_)));
    assert_eq!(err.kind(), ErrorKind::Authorization);
}

#[tokio::test]
async fn test_token_for_other_reader_is_refused() {
    let (env, file) = invoice_env().await;
    env.session.manage_user(UserOp::Add, "erin", Role::Reader).await.unwrap();

    let token = env.session.request_read(&file, "carol").await.unwrap();
    let erin = env.session.registry().await.readers().get("erin").cloned().unwrap();
    let stolen = FileRequestToken {
        handle: ReencryptionHandle::bind(&token.file_id, &token.read_record_id, &erin),
        credential: erin,
        ..token
    };

    let err = env.session.read_file(&stolen).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ReencryptionRefused(_)));
}

#[tokio::test]
async fn test_session_state_transitions() {
    let env = TestEnv::bootstrap("alice").await;
    assert_eq!(env.session.state().await, SessionState::AclEstablished);

    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    assert_eq!(env.session.state().await, SessionState::AclEstablished);

    env.store_document("bob", b"first").await.unwrap();
    assert_eq!(env.session.state().await, SessionState::Operational);
}

#[tokio::test]
async fn test_snapshot_round_trip() {
    let (env, file) = invoice_env().await;
    let restored = env.fork().await;

    assert_eq!(restored.latest_acl().await, env.session.latest_acl().await);
    assert_eq!(restored.latest_data().await, env.session.latest_data().await);
    assert_eq!(restored.registry().await, env.session.registry().await);
    assert_eq!(restored.admin(), env.session.admin());
    assert_eq!(restored.state().await, SessionState::Operational);

    let token = restored.request_read(&file, "carol").await.unwrap();
    let contents = restored.read_file(&token).await.unwrap();
    let keys = restored.keys("carol").await.unwrap();
    assert_eq!(contents.decrypt(&keys).unwrap(), b"invoice");

    let (payload, key) = EncryptedPayload::seal(b"receipt").unwrap();
    let sealed = restored.request_encryption_target(&key).await.unwrap();
    restored.write_file(payload, sealed, "bob").await.unwrap();
}

#[tokio::test]
async fn test_snapshot_size_independent_of_files() {
    let (env, _) = invoice_env().await;
    let one = env.session.to_bytes().await.unwrap();

    for i in 0..5 {
        env.store_document("bob", format!("invoice {}", i).as_bytes()).await.unwrap();
    }
    let six = env.session.to_bytes().await.unwrap();

    // Only the data tip changes; its encoded length varies slightly.
    assert!(one.len().abs_diff(six.len()) <= 32);
    assert!(six.len() < 4096, "snapshot is {} bytes", six.len());
}

#[tokio::test]
async fn test_unmarshal_fails_closed() {
    let (env, _) = invoice_env().await;
    let bytes = env.session.to_bytes().await.unwrap();

    let inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        b"not a session".to_vec(),
        bytes[..bytes.len() / 2].to_vec(),
    ];
    for input in inputs {
        let result = Session::from_bytes(
            &input,
            env.ledger.clone(),
            env.crypto.clone(),
            SessionConfig::default(),
        );
        assert!(matches!(result, Err(ProtocolError::Unmarshal(_))));
    }
}

#[tokio::test]
async fn test_acl_conflict_then_refresh() {
    let env = TestEnv::bootstrap("alice").await;
    let other = env.fork().await;

    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();

    let before = other.registry().await;
    let err = other.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap_err();
    assert!(matches!(err, ProtocolError::CommitConflict(_)));
    assert!(err.is_retryable());
    assert_eq!(other.registry().await, before);

    other.refresh().await.unwrap();
    other.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap();

    let registry = other.registry().await;
    assert!(registry.writers().contains("bob"));
    assert!(registry.readers().contains("carol"));
    let tip = env.ledger.get_latest(&env.session.acl_chain()).await.unwrap();
    assert_eq!(other.latest_acl().await, tip);
}

#[tokio::test]
async fn test_data_conflict_then_refresh() {
    let (env, _) = invoice_env().await;
    let other = env.fork().await;

    env.store_document("bob", b"first").await.unwrap();

    let (payload, key) = EncryptedPayload::seal(b"second").unwrap();
    let sealed = other.request_encryption_target(&key).await.unwrap();
    let err = other
        .write_file(payload.clone(), sealed.clone(), "bob")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommitConflict);

    other.refresh().await.unwrap();
    other.write_file(payload, sealed, "bob").await.unwrap();
}

#[tokio::test]
async fn test_authorized_only_leaves_no_trace() {
    let (env, file) = invoice_env().await;
    let height = env.ledger.height(&env.session.data_chain());

    let err = env.session.request_read(&file, "dave").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnauthorizedReader(_)));
    assert_eq!(env.ledger.height(&env.session.data_chain()), height);
}

#[tokio::test]
async fn test_record_denials_appends_audit_block() {
    let env = TestEnv::with_config("alice", SessionConfig::recording_denials()).await;
    assert_eq!(env.session.config().read_audit, ReadAuditPolicy::RecordDenials);
    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    let file = env.store_document("bob", b"invoice").await.unwrap();
    let height = env.ledger.height(&env.session.data_chain());

    let err = env.session.request_read(&file, "dave").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnauthorizedReader(_)));
    assert_eq!(env.ledger.height(&env.session.data_chain()), height + 1);

    let tip = env.session.latest_data().await;
    let block = env.ledger.get_block(&env.session.data_chain(), &tip).await.unwrap();
    assert_eq!(
        DataBlock::from_bytes(&block.payload).unwrap(),
        DataBlock::DeniedRead {
            file,
            pseudonym: "dave".into()
        }
    );

    // Denials are not read requests.
    assert!(env.session.read_requests(None, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_denial_with_stale_tip_still_refuses() {
    let env = TestEnv::with_config("alice", SessionConfig::recording_denials()).await;
    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    let other = env.fork().await;
    let file = env.store_document("bob", b"invoice").await.unwrap();
    let height = env.ledger.height(&env.session.data_chain());
    let tip = other.latest_data().await;

    // The audit block cannot land on a stale tip; the refusal still stands.
    let err = other.request_read(&file, "dave").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnauthorizedReader(ref name) if name == "dave"));
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(!err.is_retryable());

    assert_eq!(env.ledger.height(&env.session.data_chain()), height);
    assert_eq!(other.latest_data().await, tip);
}

#[tokio::test]
async fn test_re_adding_user_without_held_keys_fails() {
    let env = TestEnv::bootstrap("alice").await;
    let other = env.fork().await;
    env.session.manage_user(UserOp::Add, "bob", Role::Writer).await.unwrap();
    env.session.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap();
    let file = env.store_document("bob", b"invoice").await.unwrap();

    other.refresh().await.unwrap();
    let acl_height = env.ledger.height(&other.acl_chain());
    for role in [Role::Reader, Role::Writer] {
        let err = other.manage_user(UserOp::Add, "carol", role).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownUser(ref name) if name == "carol"));
    }
    assert_eq!(env.ledger.height(&other.acl_chain()), acl_height);
    assert_eq!(other.registry().await, env.session.registry().await);

    let data_height = env.ledger.height(&other.data_chain());
    let err = other.request_read(&file, "carol").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownUser(_)));
    assert_eq!(env.ledger.height(&other.data_chain()), data_height);

    // The session holding carol's keys is unaffected.
    let token = env.session.request_read(&file, "carol").await.unwrap();
    let contents = env.session.read_file(&token).await.unwrap();
    let keys = env.session.keys("carol").await.unwrap();
    assert_eq!(contents.decrypt(&keys).unwrap(), b"invoice");
}

#[tokio::test]
async fn test_refresh_drops_replaced_keys() {
    let (env, file) = invoice_env().await;
    let other = env.fork().await;

    // carol is re-registered elsewhere with new keys.
    env.session.remove_user("carol").await.unwrap();
    env.session.manage_user(UserOp::Add, "carol", Role::Reader).await.unwrap();
    assert_ne!(env.session.keys("carol").await.unwrap(), other.keys("carol").await.unwrap());

    other.refresh().await.unwrap();
    assert!(matches!(other.keys("carol").await, Err(ProtocolError::UnknownUser(_))));
    assert!(other.keys("bob").await.is_ok());

    let height = env.ledger.height(&other.data_chain());
    let err = other.request_read(&file, "carol").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownUser(_)));
    assert_eq!(env.ledger.height(&other.data_chain()), height);
}

#[tokio::test]
async fn test_read_requests_listing() {
    let (env, file) = invoice_env().await;
    env.session.manage_user(UserOp::Add, "dave", Role::Reader).await.unwrap();

    let first = env.session.request_read(&file, "carol").await.unwrap();
    env.store_document("bob", b"second").await.unwrap();
    let second = env.session.request_read(&file, "dave").await.unwrap();

    let all = env.session.read_requests(None, 10).await.unwrap();
    let ids: Vec<_> = all.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![first.read_record_id, second.read_record_id]);
    assert_eq!(all[0].1.pseudonym, "carol");
    assert_eq!(all[1].1.pseudonym, "dave");
    assert!(all.iter().all(|(_, request)| request.file == file));

    let from_second = env
        .session
        .read_requests(Some(second.read_record_id), 10)
        .await
        .unwrap();
    assert_eq!(from_second.len(), 1);

    assert_eq!(env.session.read_requests(None, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_user_keys() {
    let env = TestEnv::bootstrap("alice").await;
    let err = env.session.keys("nobody").await.unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownUser(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_every_registry_op_appends_one_block(ops in prop::collection::vec(user_op(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let env = TestEnv::bootstrap("alice").await;
            let chain = env.session.acl_chain();

            for (i, (op, name, role)) in ops.iter().enumerate() {
                env.session.manage_user(*op, name, *role).await.unwrap();
                assert_eq!(env.ledger.height(&chain), i + 2);

                let registry = env.session.registry().await;
                assert!(!registry.admins().is_empty());
                assert!(env.session.keys("alice").await.is_ok());
                for pseudonym in ["bob", "carol", "dave"] {
                    let held = !registry.roles_of(pseudonym).is_empty();
                    assert_eq!(held, env.session.keys(pseudonym).await.is_ok());
                }
            }
        });
    }
}
