use storage::repository::{KeyValueStore, Storage};
use storage::sqlite::SqliteStore;

#[tokio::test]
async fn sqlite_roundtrip_replaces_values() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");

    assert_eq!(store.get("orbit.progress").await.unwrap(), None);

    store.set("orbit.progress", r#"{"user":{}}"#).await.unwrap();
    store
        .set("orbit.progress", r#"{"user":{"level":2}}"#)
        .await
        .unwrap();

    let value = store.get("orbit.progress").await.unwrap();
    assert_eq!(value.as_deref(), Some(r#"{"user":{"level":2}}"#));
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("first migrate");
    store.set("k", "v").await.unwrap();
    store.migrate().await.expect("second migrate");

    assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn storage_builder_runs_migrations() {
    let storage = Storage::sqlite("sqlite:file:memdb_kv_storage?mode=memory&cache=shared")
        .await
        .expect("storage");
    storage.kv.set("a", "1").await.unwrap();
    assert_eq!(storage.kv.get("a").await.unwrap().as_deref(), Some("1"));
}
