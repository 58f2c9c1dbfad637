//! Behavioural checks every [`RouteStore`] backend must pass.
//!
//! Each check expects a fresh, empty store and panics on violation. Backend
//! crates call them from their integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;

use crate::{IterState, NEXT_ID_KEY, Route, RouteStore, StoreError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 9, 29, 22, 23, 56).unwrap()
}

fn route(dest: &str) -> Route {
    Route::with_time(dest, t0())
}

async fn names<S: RouteStore + ?Sized>(store: &S, prefix: &str) -> Vec<String> {
    let mut iter = store.list(prefix).await.unwrap();
    let mut names = Vec::new();
    while iter.next().await {
        names.push(iter.name().unwrap().to_string());
    }
    assert!(iter.error().is_none(), "listing failed: {:?}", iter.error());
    iter.release().await;
    names
}

/// `get` of a key that was never written is `NotFound`.
pub async fn get_missing<S: RouteStore + ?Sized>(store: &S) {
    let err = store.get("never-written").await.unwrap_err();
    assert!(err.is_not_found(), "expected NotFound, got {err:?}");

    let err = store.get(NEXT_ID_KEY).await.unwrap_err();
    assert!(err.is_not_found(), "counter key must not resolve: {err:?}");
}

/// `put` then `get` returns an equal route, and `put` overwrites.
pub async fn put_then_get<S: RouteStore + ?Sized>(store: &S) {
    let first = route("http://example.com");
    store.put("x", &first).await.unwrap();
    assert_eq!(store.get("x").await.unwrap(), first);

    let second = Route::with_time("http://example.org/other", Utc::now());
    store.put("x", &second).await.unwrap();
    assert_eq!(store.get("x").await.unwrap(), second);
}

/// `del` is idempotent and removes the route.
pub async fn del_idempotent<S: RouteStore + ?Sized>(store: &S) {
    store.del("absent").await.unwrap();

    store.put("doomed", &route("http://example.com")).await.unwrap();
    store.del("doomed").await.unwrap();
    assert!(store.get("doomed").await.unwrap_err().is_not_found());

    store.del("doomed").await.unwrap();
}

/// The counter key and the empty key can't be written or deleted.
pub async fn reserved_keys<S: RouteStore + ?Sized>(store: &S) {
    let r = route("http://example.com");
    assert!(matches!(
        store.put(NEXT_ID_KEY, &r).await,
        Err(StoreError::InvalidKey(_))
    ));
    assert!(matches!(store.put("", &r).await, Err(StoreError::InvalidKey(_))));
    assert!(matches!(
        store.del(NEXT_ID_KEY).await,
        Err(StoreError::InvalidKey(_))
    ));
}

/// A route without a destination is refused and nothing is written.
pub async fn put_rejects_empty_destination<S: RouteStore + ?Sized>(store: &S) {
    let fine = route("http://example.com");
    store.put("ok", &fine).await.unwrap();

    assert!(matches!(
        store.put("blank", &route("")).await,
        Err(StoreError::InvalidRoute { .. })
    ));
    assert!(store.get("blank").await.unwrap_err().is_not_found());

    let expected = BTreeMap::from([("ok".to_string(), fine)]);
    assert_eq!(store.get_all().await.unwrap(), expected);
}

/// Sequential `next_id` calls yield `1..=n`.
pub async fn next_id_sequential<S: RouteStore + ?Sized>(store: &S, n: u64) {
    for expected in 1..=n {
        assert_eq!(store.next_id().await.unwrap(), expected);
        // Unrelated operations don't disturb the sequence.
        store
            .put(&format!("k{expected}"), &route("http://example.com"))
            .await
            .unwrap();
    }
}

/// `n` concurrent `next_id` calls yield exactly `{1..=n}`.
pub async fn next_id_concurrent<S: RouteStore>(store: Arc<S>, n: u64) {
    let calls = (0..n).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.next_id().await.unwrap() })
    });

    let ids: Vec<u64> = join_all(calls)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    let distinct: BTreeSet<u64> = ids.iter().copied().collect();

    assert_eq!(ids.len(), distinct.len(), "duplicate ids: {ids:?}");
    assert_eq!(distinct, (1..=n).collect());
}

/// Prefix listing visits exactly the matching keys, once each.
pub async fn list_prefix<S: RouteStore + ?Sized>(store: &S) {
    for key in ["a/1", "a/2", "b/1"] {
        store.put(key, &route("http://example.com")).await.unwrap();
    }
    store.next_id().await.unwrap();

    let mut listed = names(store, "a/").await;
    listed.sort();
    assert_eq!(listed, vec!["a/1", "a/2"]);

    let mut all = names(store, "").await;
    all.sort();
    assert_eq!(all, vec!["a/1", "a/2", "b/1"]);

    assert!(names(store, "c/").await.is_empty());
    assert!(names(store, "next").await.is_empty());
}

/// Listing many keys crosses backend page boundaries without losing any.
pub async fn list_many<S: RouteStore + ?Sized>(store: &S, count: usize) {
    for i in 0..count {
        store
            .put(&format!("bulk/{i:05}"), &route("http://example.com"))
            .await
            .unwrap();
    }

    let listed = names(store, "bulk/").await;
    let distinct: BTreeSet<&String> = listed.iter().collect();
    assert_eq!(listed.len(), count);
    assert_eq!(distinct.len(), count);
}

/// The iterator moves through Ready, Positioned and Exhausted.
pub async fn iterator_states<S: RouteStore + ?Sized>(store: &S) {
    store.put("only", &route("http://example.com")).await.unwrap();

    let mut iter = store.list("").await.unwrap();
    assert_eq!(iter.state(), IterState::Ready);
    assert!(iter.name().is_none());

    assert!(iter.next().await);
    assert_eq!(iter.state(), IterState::Positioned);
    assert_eq!(iter.name(), Some("only"));
    assert_eq!(iter.route(), Some(&route("http://example.com")));

    assert!(!iter.next().await);
    assert_eq!(iter.state(), IterState::Exhausted);
    assert!(iter.route().is_none());

    iter.release().await;
    iter.release().await;
}

/// `get_all` returns the routes, without the counter.
pub async fn get_all_excludes_counter<S: RouteStore + ?Sized>(store: &S) {
    assert!(store.get_all().await.unwrap().is_empty());

    let r1 = route("http://one.example.com");
    let r2 = route("http://two.example.com");
    store.put("k1", &r1).await.unwrap();
    store.put("k2", &r2).await.unwrap();
    store.next_id().await.unwrap();
    store.next_id().await.unwrap();

    let expected = BTreeMap::from([("k1".to_string(), r1), ("k2".to_string(), r2)]);
    assert_eq!(store.get_all().await.unwrap(), expected);
}

/// Deleting keys mid-traversal neither errors nor cuts it short.
pub async fn delete_during_list<S: RouteStore + ?Sized>(store: &S) {
    let keys: Vec<String> = (0..20).map(|i| format!("d/{i:02}")).collect();
    for key in &keys {
        store.put(key, &route("http://example.com")).await.unwrap();
    }

    let mut iter = store.list("d/").await.unwrap();
    assert!(iter.next().await);
    let first = iter.name().unwrap().to_string();

    // Remove every other key that hasn't been visited yet.
    let removed: BTreeSet<&String> = keys.iter().filter(|k| **k != first).step_by(2).collect();
    for key in &removed {
        store.del(key).await.unwrap();
    }

    let mut visited = vec![first];
    while iter.next().await {
        visited.push(iter.name().unwrap().to_string());
    }
    assert!(iter.error().is_none(), "traversal failed: {:?}", iter.error());
    iter.release().await;

    let survivors: BTreeSet<&String> = keys.iter().filter(|k| !removed.contains(k)).collect();
    for key in survivors {
        assert!(visited.contains(key), "traversal stopped before {key}");
    }
}

/// Undecodable stored data surfaces as a decode error from `get_all`.
///
/// `corrupt` must write undecodable bytes under the given key using the
/// backend's native client.
pub async fn corrupt_value_aborts_dump<S, F, Fut>(store: &S, corrupt: F)
where
    S: RouteStore + ?Sized,
    F: FnOnce(&'static str) -> Fut,
    Fut: Future<Output = ()>,
{
    store.put("fine", &route("http://example.com")).await.unwrap();
    corrupt("broken").await;

    assert!(matches!(
        store.get("broken").await,
        Err(StoreError::Decode { .. })
    ));
    assert!(matches!(
        store.get_all().await,
        Err(StoreError::Decode { .. })
    ));
}

/// The end-to-end lifecycle of a single link.
pub async fn scenario<S: RouteStore + ?Sized>(store: &S) {
    let r = route("http://example.com");
    store.put("x", &r).await.unwrap();
    assert_eq!(store.get("x").await.unwrap(), r);
    assert_eq!(store.next_id().await.unwrap(), 1);
    store.del("x").await.unwrap();
    assert!(store.get("x").await.unwrap_err().is_not_found());
    assert!(store.get_all().await.unwrap().is_empty());
}

/// `close` twice is fine; afterwards operations fail as closed.
pub async fn close_idempotent<S: RouteStore + ?Sized>(store: &S) {
    store.close().await.unwrap();
    store.close().await.unwrap();

    assert!(matches!(store.get("x").await, Err(StoreError::Closed)));
    assert!(matches!(store.next_id().await, Err(StoreError::Closed)));
}
