use std::sync::Arc;

use bytes::Bytes;
use golink_store::conformance;
use golink_store_memory::MemoryStore;

fn store() -> MemoryStore {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // Small pages so listings cross page boundaries.
    MemoryStore::new().with_page_size(3)
}

#[tokio::test]
async fn test_get_missing() {
    conformance::get_missing(&store()).await;
}

#[tokio::test]
async fn test_put_then_get() {
    conformance::put_then_get(&store()).await;
}

#[tokio::test]
async fn test_del_idempotent() {
    conformance::del_idempotent(&store()).await;
}

#[tokio::test]
async fn test_reserved_keys() {
    conformance::reserved_keys(&store()).await;
}

#[tokio::test]
async fn test_put_rejects_empty_destination() {
    conformance::put_rejects_empty_destination(&store()).await;
}

#[tokio::test]
async fn test_next_id_sequential() {
    conformance::next_id_sequential(&store(), 25).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_next_id_concurrent() {
    conformance::next_id_concurrent(Arc::new(store()), 100).await;
}

#[tokio::test]
async fn test_list_prefix() {
    conformance::list_prefix(&store()).await;
}

#[tokio::test]
async fn test_list_many() {
    conformance::list_many(&store(), 200).await;
}

#[tokio::test]
async fn test_iterator_states() {
    conformance::iterator_states(&store()).await;
}

#[tokio::test]
async fn test_get_all_excludes_counter() {
    conformance::get_all_excludes_counter(&store()).await;
}

#[tokio::test]
async fn test_delete_during_list() {
    conformance::delete_during_list(&store()).await;
}

#[tokio::test]
async fn test_corrupt_value_aborts_dump() {
    let store = store();
    let raw = store.clone();
    conformance::corrupt_value_aborts_dump(&store, |key| async move {
        raw.put_raw(key, Bytes::from_static(b"{not json"))
            .await
            .unwrap();
    })
    .await;
}

#[tokio::test]
async fn test_scenario() {
    conformance::scenario(&store()).await;
}

#[tokio::test]
async fn test_close_idempotent() {
    conformance::close_idempotent(&store()).await;
}
