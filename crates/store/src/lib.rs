//! Route store abstraction shared by every go-link backend.
//!
//! A [`RouteStore`] maps short names to [`Route`]s, enumerates them lazily
//! through a [`RouteIterator`], and mints sequential IDs for unnamed links.
//! Backends differ in their native pagination; [`ScanIterator`] adapts a
//! backend's [`KeyCursor`] into the common iterator state machine.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

#[cfg(feature = "conformance")]
pub mod conformance;
mod error;
mod guard;
mod iter;
mod route;

pub use error::{ErrorKind, StoreError, StoreResult};
pub use guard::{Guarded, GuardedIterator};
pub use iter::{IterState, KeyCursor, RouteIterator, RouteLookup, ScanIterator};
pub use route::Route;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

/// Reserved key holding the ID allocator's counter.
///
/// Never a valid route key; excluded from listings and dumps.
pub const NEXT_ID_KEY: &str = "nextID";

/// Boxed iterator returned by [`RouteStore::list`].
pub type BoxRouteIterator = Box<dyn RouteIterator>;

/// A persistent mapping from short names to routes.
///
/// Every operation is safe to call concurrently. Operations never retry
/// internally; failures are returned to the caller as-is.
#[async_trait]
pub trait RouteStore: Debug + Send + Sync + 'static {
    /// Fetch the route stored under `key`.
    ///
    /// Returns [`StoreError::NotFound`] when the key is absent.
    async fn get(&self, key: &str) -> StoreResult<Route>;

    /// Store `route` under `key`, replacing any existing value.
    async fn put(&self, key: &str, route: &Route) -> StoreResult<()>;

    /// Delete `key`. Deleting an absent key succeeds.
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// Lazily enumerate routes whose key starts with `prefix`.
    ///
    /// The traversal takes no lock over the keyspace: routes written or
    /// deleted while it runs may or may not be observed. Routes deleted
    /// between enumeration and lookup are skipped.
    async fn list(&self, prefix: &str) -> StoreResult<BoxRouteIterator>;

    /// Dump every route, excluding the allocator counter.
    ///
    /// Fails as a whole if any route cannot be read or decoded.
    async fn get_all(&self) -> StoreResult<BTreeMap<String, Route>> {
        let mut iter = self.list("").await?;
        iter.collect_routes().await
    }

    /// Atomically increment the allocator counter and return the new value.
    ///
    /// The first call on a fresh store returns 1.
    async fn next_id(&self) -> StoreResult<u64>;

    /// Check that the backing technology is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Release held connections. Calling it more than once is harmless.
    async fn close(&self) -> StoreResult<()>;
}

#[async_trait]
impl<T: RouteStore + ?Sized> RouteStore for Arc<T> {
    async fn get(&self, key: &str) -> StoreResult<Route> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, route: &Route) -> StoreResult<()> {
        (**self).put(key, route).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        (**self).del(key).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<BoxRouteIterator> {
        (**self).list(prefix).await
    }

    async fn get_all(&self) -> StoreResult<BTreeMap<String, Route>> {
        (**self).get_all().await
    }

    async fn next_id(&self) -> StoreResult<u64> {
        (**self).next_id().await
    }

    async fn ping(&self) -> StoreResult<()> {
        (**self).ping().await
    }

    async fn close(&self) -> StoreResult<()> {
        (**self).close().await
    }
}

/// Reject keys that can't name a route.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] for the empty key and [`NEXT_ID_KEY`].
pub fn check_route_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey("key is empty".to_string()));
    }

    if key == NEXT_ID_KEY {
        return Err(StoreError::InvalidKey(format!("{key} is reserved")));
    }

    Ok(())
}

/// Validate a key and route before they are written.
///
/// Everything `put` accepts must decode again.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] as [`check_route_key`] does, and
/// [`StoreError::InvalidRoute`] for an empty destination.
pub fn check_route(key: &str, route: &Route) -> StoreResult<()> {
    check_route_key(key)?;

    if route.destination.is_empty() {
        return Err(StoreError::InvalidRoute {
            key: key.to_string(),
            reason: "destination is empty",
        });
    }

    Ok(())
}

/// Smallest byte string greater than every string starting with `prefix`.
///
/// `None` means the range is unbounded above (empty or all-`0xFF` prefix).
#[must_use]
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// [`prefix_end`] for backends that compare keys as UTF-8 strings.
///
/// Increments the last code point, carrying past `char::MAX`.
#[must_use]
pub fn prefix_end_str(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        let next = match u32::from(last) + 1 {
            0xD800 => Some('\u{E000}'),
            n => char::from_u32(n),
        };
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}
