//! Sled-backed registry state survives a restart.

use ippan_identity_registry::{
    AccountId, CallContext, IdentityHash, IdentityRegistry, IdentityStatus, RegistryConfig,
    SledStore,
};
use ippan_identity_registry::config::StorageBackend;
use tempfile::TempDir;

const ADMIN: AccountId = AccountId([0xAD; 32]);
const U1: AccountId = AccountId([0x01; 32]);
const U2: AccountId = AccountId([0x02; 32]);

#[test]
fn sled_restart_restores_records_index_and_history() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().to_path_buf();
    let hash = IdentityHash::digest(b"persisted person");

    {
        let store = SledStore::open(&path).expect("sled store");
        let mut registry = IdentityRegistry::new(store, ADMIN);
        registry
            .register(&CallContext::new(U1, 100), hash.as_bytes(), "m1")
            .unwrap();
        registry
            .update_metadata(&CallContext::new(U1, 101), hash.as_bytes(), "m2", "move")
            .unwrap();
        registry
            .verify(&CallContext::new(ADMIN, 102), hash.as_bytes())
            .unwrap();
        registry
            .transfer_ownership(&CallContext::new(U1, 103), hash.as_bytes(), U2)
            .unwrap();
        registry.store().flush().unwrap();
    }

    let store = SledStore::open(&path).expect("reopen sled store");
    let mut registry = IdentityRegistry::new(store, ADMIN);

    let record = registry.get_identity(&hash).unwrap().unwrap();
    assert_eq!(record.owner, U2);
    assert_eq!(record.registered_at, 100);
    assert_eq!(record.metadata, "m2");
    assert_eq!(record.status, IdentityStatus::Verified);
    assert!(record.verified);

    assert!(registry.get_identity_by_owner(&U1).unwrap().is_none());
    assert_eq!(registry.get_identity_by_owner(&U2).unwrap(), Some(hash));

    assert_eq!(registry.get_update_count(&hash).unwrap(), 3);
    let changes: Vec<String> = registry
        .history(&hash)
        .unwrap()
        .into_iter()
        .map(|entry| entry.changes)
        .collect();
    assert_eq!(changes, vec!["move", "Identity verified", "Ownership transferred"]);

    // Sequence numbering continues where it left off.
    registry
        .update_metadata(&CallContext::new(U2, 104), hash.as_bytes(), "m3", "after restart")
        .unwrap();
    assert_eq!(registry.get_update_count(&hash).unwrap(), 4);
    assert_eq!(
        registry.get_history_entry(&hash, 4).unwrap().unwrap().previous_metadata,
        "m2"
    );
}

#[test]
fn configured_sled_registry_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let mut config = RegistryConfig::new(ADMIN);
    config.storage.backend = StorageBackend::Sled;
    config.storage.path = Some(dir.path().join("identity-db"));
    let hash = IdentityHash::new([0x42; 32]);

    {
        let mut registry = config.open_registry().unwrap();
        registry
            .register(&CallContext::new(U1, 1), hash.as_bytes(), "configured")
            .unwrap();
        registry.store().flush().unwrap();
    }

    let registry = config.open_registry().unwrap();
    assert_eq!(
        registry.get_identity(&hash).unwrap().unwrap().metadata,
        "configured"
    );
}
