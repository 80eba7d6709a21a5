use chrono::Utc;
use clinic_checkout::application::normalizer::normalize;
use clinic_checkout::application::session_store::{RegistrationPatch, SessionStore};
use clinic_checkout::config::StorageKeys;
use clinic_checkout::domain::ports::SessionStorage;
use clinic_checkout::domain::session::{Session, SessionSource};
use clinic_checkout::error::StoreError;
use clinic_checkout::infrastructure::file::JsonFileStorage;
use clinic_checkout::infrastructure::in_memory::InMemorySessionStorage;
use serde_json::json;
use std::sync::Arc;
use tempfile::tempdir;

fn session() -> Session {
    normalize(
        &json!({
            "customerName": "Dr. A",
            "email": "a@x.com",
            "plan": { "name": "Professional", "price": 5_000_000 },
            "amount": 5_000_000,
            "orderId": "ORDER-1",
            "transactionId": "TXN-1"
        }),
        SessionSource::Checkout,
        Utc::now(),
    )
    .session
}

fn file_store(dir: &std::path::Path, tab: InMemorySessionStorage) -> SessionStore {
    SessionStore::new(
        Arc::new(JsonFileStorage::new(dir)),
        Arc::new(tab),
        StorageKeys::default(),
    )
}

#[tokio::test]
async fn test_round_trip_across_restarts() {
    let dir = tempdir().unwrap();
    let s = session();

    // First process: save.
    {
        let store = file_store(dir.path(), InMemorySessionStorage::new());
        store.save(s.clone()).await.unwrap();
    }

    // Second process: nothing in memory, durable tier on disk.
    let store = file_store(dir.path(), InMemorySessionStorage::new());
    assert!(store.current().await.is_none());
    assert_eq!(store.load().await, Some(s));
}

#[tokio::test]
async fn test_corrupted_durable_falls_back_to_tab() {
    let dir = tempdir().unwrap();
    let tab = InMemorySessionStorage::new();
    let s = session();
    {
        let store = file_store(dir.path(), tab.clone());
        store.save(s.clone()).await.unwrap();
    }
    std::fs::write(dir.path().join("clinic.session.json"), "{ not json").unwrap();

    let store = file_store(dir.path(), tab);
    assert_eq!(store.load().await, Some(s));
}

#[tokio::test]
async fn test_record_without_order_is_treated_as_absent() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("clinic.session.json"),
        r#"{"customer":{"email":"a@x.com"}}"#,
    )
    .unwrap();

    let store = file_store(dir.path(), InMemorySessionStorage::new());
    assert!(store.load().await.is_none());
    assert!(store.persisted_hint().await.is_none());
}

#[tokio::test]
async fn test_clear_wipes_both_tiers() {
    let dir = tempdir().unwrap();
    let tab = InMemorySessionStorage::new();
    let store = file_store(dir.path(), tab.clone());
    store.save(session()).await.unwrap();
    store
        .complete_registration(RegistrationPatch {
            password: Some("h".to_string()),
            remember_me: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(dir.path().join("clinic.remembered.json").exists());

    store.clear().await.unwrap();

    assert!(store.load().await.is_none());
    assert!(tab.is_empty().await);
    assert!(!dir.path().join("clinic.session.json").exists());
    assert!(!dir.path().join("clinic.remembered.json").exists());
}

#[tokio::test]
async fn test_stale_write_between_processes() {
    let dir = tempdir().unwrap();
    let first = file_store(dir.path(), InMemorySessionStorage::new());
    let second = file_store(dir.path(), InMemorySessionStorage::new());

    first.save(session()).await.unwrap();
    let stale = second.load().await.unwrap();
    first
        .complete_registration(RegistrationPatch::default())
        .await
        .unwrap();

    let result = second.save(stale).await;
    assert!(matches!(
        result,
        Err(StoreError::StaleWrite {
            persisted: 1,
            attempted: 0
        })
    ));

    // The second process recovers by reloading.
    second.clear_memory().await;
    let fresh = second.load().await.unwrap();
    assert!(fresh.registration_completed);
    assert_eq!(fresh.revision, 1);
}

#[tokio::test]
async fn test_registration_survives_restart() {
    let dir = tempdir().unwrap();
    {
        let store = file_store(dir.path(), InMemorySessionStorage::new());
        store.save(session()).await.unwrap();
        store
            .complete_registration(RegistrationPatch {
                password: Some("h".to_string()),
                clinic_name: Some("Klinik Baru".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let store = file_store(dir.path(), InMemorySessionStorage::new());
    let restored = store.load().await.unwrap();
    assert_eq!(restored.order_id, "ORDER-1");
    assert_eq!(restored.transaction_id, "TXN-1");
    assert_eq!(restored.customer.clinic_name, "Klinik Baru");
    assert!(restored.registration_completed && restored.account_created);
    assert!(restored.credential_digest.is_some());
    assert!(restored.registration_date.is_some());
}

#[tokio::test]
async fn test_session_keys_are_configurable() {
    let durable = InMemorySessionStorage::new();
    let keys = StorageKeys {
        durable: "tenant-7.session".to_string(),
        tab_scoped: "tenant-7.session.tab".to_string(),
        remembered_credentials: "tenant-7.remembered".to_string(),
    };
    let store = SessionStore::new(
        Arc::new(durable.clone()),
        Arc::new(InMemorySessionStorage::new()),
        keys,
    );
    store.save(session()).await.unwrap();
    assert!(durable.read("tenant-7.session").await.unwrap().is_some());
    assert!(durable.read("clinic.session").await.unwrap().is_none());
}

#[cfg(feature = "storage-rocksdb")]
#[tokio::test]
async fn test_rocksdb_durable_tier_recovery() {
    use clinic_checkout::infrastructure::rocksdb::RocksDbSessionStorage;

    let dir = tempdir().unwrap();
    let s = session();
    {
        let durable = RocksDbSessionStorage::open(dir.path()).unwrap();
        let store = SessionStore::new(
            Arc::new(durable),
            Arc::new(InMemorySessionStorage::new()),
            StorageKeys::default(),
        );
        store.save(s.clone()).await.unwrap();
    }

    let durable = RocksDbSessionStorage::open(dir.path()).unwrap();
    let store = SessionStore::new(
        Arc::new(durable),
        Arc::new(InMemorySessionStorage::new()),
        StorageKeys::default(),
    );
    assert_eq!(store.load().await, Some(s));
}
