use std::sync::Arc;

use golink_store::{RouteStore, conformance};
use golink_store_rocksdb::{RocksDbStore, RocksDbStoreOptions};
use tempfile::TempDir;

// Keep the directory alive for as long as the store.
async fn store() -> (RocksDbStore, TempDir) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let temp_dir = TempDir::new().unwrap();
    let store = RocksDbStore::new(RocksDbStoreOptions::new(temp_dir.path()).with_page_size(3))
        .await
        .unwrap();
    (store, temp_dir)
}

#[tokio::test]
async fn test_get_missing() {
    let (store, _dir) = store().await;
    conformance::get_missing(&store).await;
}

#[tokio::test]
async fn test_put_then_get() {
    let (store, _dir) = store().await;
    conformance::put_then_get(&store).await;
}

#[tokio::test]
async fn test_del_idempotent() {
    let (store, _dir) = store().await;
    conformance::del_idempotent(&store).await;
}

#[tokio::test]
async fn test_reserved_keys() {
    let (store, _dir) = store().await;
    conformance::reserved_keys(&store).await;
}

#[tokio::test]
async fn test_put_rejects_empty_destination() {
    let (store, _dir) = store().await;
    conformance::put_rejects_empty_destination(&store).await;
}

#[tokio::test]
async fn test_next_id_sequential() {
    let (store, _dir) = store().await;
    conformance::next_id_sequential(&store, 25).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_next_id_concurrent() {
    let (store, _dir) = store().await;
    conformance::next_id_concurrent(Arc::new(store), 100).await;
}

#[tokio::test]
async fn test_list_prefix() {
    let (store, _dir) = store().await;
    conformance::list_prefix(&store).await;
}

#[tokio::test]
async fn test_list_many() {
    let (store, _dir) = store().await;
    conformance::list_many(&store, 500).await;
}

#[tokio::test]
async fn test_iterator_states() {
    let (store, _dir) = store().await;
    conformance::iterator_states(&store).await;
}

#[tokio::test]
async fn test_get_all_excludes_counter() {
    let (store, _dir) = store().await;
    conformance::get_all_excludes_counter(&store).await;
}

#[tokio::test]
async fn test_delete_during_list() {
    let (store, _dir) = store().await;
    conformance::delete_during_list(&store).await;
}

#[tokio::test]
async fn test_corrupt_value_aborts_dump() {
    let (store, _dir) = store().await;
    let raw = store.clone();
    conformance::corrupt_value_aborts_dump(&store, |key| async move {
        raw.put_raw(key, b"\x00\x01garbage").unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_scenario() {
    let (store, _dir) = store().await;
    conformance::scenario(&store).await;
}

#[tokio::test]
async fn test_close_idempotent() {
    let (store, _dir) = store().await;
    conformance::close_idempotent(&store).await;
}

#[tokio::test]
async fn test_iterator_fails_after_close() {
    let (store, _dir) = store().await;
    conformance::list_many(&store, 10).await;

    let mut iter = store.list("bulk/").await.unwrap();
    assert!(iter.next().await);
    store.close().await.unwrap();

    // Lookups go through the closed store, so the traversal ends with an error
    assert!(!iter.next().await);
    assert!(iter.error().is_some());
    iter.release().await;
}
