//! Runs against a live server named by `GOLINK_TEST_REDIS_URL`; every test
//! flushes that database first, so point it at a scratch instance.

use std::sync::Arc;

use golink_store::{RouteStore, conformance};
use golink_store_redis::{RedisStore, RedisStoreOptions};
use serial_test::serial;

const URL_VAR: &str = "GOLINK_TEST_REDIS_URL";

async fn raw_connection(url: &str) -> redis::aio::MultiplexedConnection {
    redis::Client::open(url)
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap()
}

async fn store() -> Option<(RedisStore, String)> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let Ok(url) = std::env::var(URL_VAR) else {
        eprintln!("{URL_VAR} not set, skipping");
        return None;
    };

    let mut conn = raw_connection(&url).await;
    redis::cmd("FLUSHDB")
        .query_async::<()>(&mut conn)
        .await
        .unwrap();

    let options = RedisStoreOptions {
        debug: true,
        scan_count: 7,
        ..RedisStoreOptions::new(url.clone())
    };
    Some((RedisStore::new(options).await.unwrap(), url))
}

#[tokio::test]
#[serial]
async fn test_get_missing() {
    let Some((store, _)) = store().await else { return };
    conformance::get_missing(&store).await;
}

#[tokio::test]
#[serial]
async fn test_put_then_get() {
    let Some((store, _)) = store().await else { return };
    conformance::put_then_get(&store).await;
}

#[tokio::test]
#[serial]
async fn test_del_idempotent() {
    let Some((store, _)) = store().await else { return };
    conformance::del_idempotent(&store).await;
}

#[tokio::test]
#[serial]
async fn test_reserved_keys() {
    let Some((store, _)) = store().await else { return };
    conformance::reserved_keys(&store).await;
}

#[tokio::test]
#[serial]
async fn test_put_rejects_empty_destination() {
    let Some((store, _)) = store().await else { return };
    conformance::put_rejects_empty_destination(&store).await;
}

#[tokio::test]
#[serial]
async fn test_next_id_sequential() {
    let Some((store, _)) = store().await else { return };
    conformance::next_id_sequential(&store, 25).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_next_id_concurrent() {
    let Some((store, _)) = store().await else { return };
    conformance::next_id_concurrent(Arc::new(store), 100).await;
}

#[tokio::test]
#[serial]
async fn test_list_prefix() {
    let Some((store, _)) = store().await else { return };
    conformance::list_prefix(&store).await;
}

#[tokio::test]
#[serial]
async fn test_list_many() {
    let Some((store, _)) = store().await else { return };
    conformance::list_many(&store, 500).await;
}

#[tokio::test]
#[serial]
async fn test_iterator_states() {
    let Some((store, _)) = store().await else { return };
    conformance::iterator_states(&store).await;
}

#[tokio::test]
#[serial]
async fn test_get_all_excludes_counter() {
    let Some((store, _)) = store().await else { return };
    conformance::get_all_excludes_counter(&store).await;
}

#[tokio::test]
#[serial]
async fn test_delete_during_list() {
    let Some((store, _)) = store().await else { return };
    conformance::delete_during_list(&store).await;
}

#[tokio::test]
#[serial]
async fn test_corrupt_value_aborts_dump() {
    let Some((store, url)) = store().await else { return };
    conformance::corrupt_value_aborts_dump(&store, |key| async move {
        let mut conn = raw_connection(&url).await;
        redis::cmd("SET")
            .arg(key)
            .arg(&b"\x00\x01garbage"[..])
            .query_async::<()>(&mut conn)
            .await
            .unwrap();
    })
    .await;
}

#[tokio::test]
#[serial]
async fn test_scenario() {
    let Some((store, _)) = store().await else { return };
    conformance::scenario(&store).await;
}

#[tokio::test]
#[serial]
async fn test_close_idempotent() {
    let Some((store, _)) = store().await else { return };
    conformance::close_idempotent(&store).await;
}

#[tokio::test]
#[serial]
async fn test_glob_characters_in_prefix() {
    let Some((store, _)) = store().await else { return };

    let route = golink_store::Route::new("https://example.com");
    for key in ["a*1", "a*2", "ab", "a?"] {
        store.put(key, &route).await.unwrap();
    }

    let mut iter = store.list("a*").await.unwrap();
    let mut listed = Vec::new();
    while iter.next().await {
        listed.push(iter.name().unwrap().to_string());
    }
    listed.sort();
    assert_eq!(listed, vec!["a*1", "a*2"]);
}
