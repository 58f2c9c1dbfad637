//! In-memory (single process) route store for local development and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use golink_store::{
    BoxRouteIterator, KeyCursor, NEXT_ID_KEY, Route, RouteLookup, RouteStore, ScanIterator,
    StoreError, StoreResult, check_route, check_route_key,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

const DEFAULT_PAGE_SIZE: usize = 64;

/// `None` once the store is closed.
type SharedMap = Arc<RwLock<Option<BTreeMap<String, Bytes>>>>;

/// In-memory route store.
///
/// Clones share the same data.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    map: SharedMap,
    page_size: usize,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            map: Arc::new(RwLock::new(Some(BTreeMap::new()))),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets how many keys a listing reads per page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stores raw bytes under `key`, bypassing route encoding.
    pub async fn put_raw(&self, key: impl Into<String>, bytes: Bytes) -> StoreResult<()> {
        let mut guard = self.map.write().await;
        let map = guard.as_mut().ok_or(StoreError::Closed)?;
        map.insert(key.into(), bytes);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Route> {
        let guard = self.map.read().await;
        let map = guard.as_ref().ok_or(StoreError::Closed)?;

        if key == NEXT_ID_KEY {
            return Err(StoreError::NotFound(key.to_string()));
        }

        match map.get(key) {
            Some(bytes) => Route::decode(key, bytes),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn put(&self, key: &str, route: &Route) -> StoreResult<()> {
        check_route(key, route)?;
        let bytes = route.encode()?;
        self.put_raw(key, bytes).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        check_route_key(key)?;

        let mut guard = self.map.write().await;
        let map = guard.as_mut().ok_or(StoreError::Closed)?;
        if map.remove(key).is_some() {
            debug!(key, "route deleted");
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<BoxRouteIterator> {
        if self.map.read().await.is_none() {
            return Err(StoreError::Closed);
        }

        let cursor = MemoryCursor {
            after: None,
            done: false,
            map: self.map.clone(),
            page_size: self.page_size,
            prefix: prefix.to_string(),
        };
        Ok(Box::new(ScanIterator::new(cursor, self.clone(), prefix)))
    }

    async fn next_id(&self) -> StoreResult<u64> {
        let mut guard = self.map.write().await;
        let map = guard.as_mut().ok_or(StoreError::Closed)?;

        let current = match map.get(NEXT_ID_KEY) {
            Some(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| StoreError::Backend("counter value is not an integer".to_string()))?,
            None => 0,
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend("counter overflow".to_string()))?;
        map.insert(NEXT_ID_KEY.to_string(), Bytes::from(next.to_string()));

        Ok(next)
    }

    async fn ping(&self) -> StoreResult<()> {
        if self.map.read().await.is_none() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if self.map.write().await.take().is_some() {
            info!("memory store closed");
        }
        Ok(())
    }
}

#[async_trait]
impl RouteLookup for MemoryStore {
    async fn lookup(&self, key: &str) -> StoreResult<Route> {
        self.get(key).await
    }
}

/// Pages through the map in key order, resuming after the last key seen.
struct MemoryCursor {
    after: Option<String>,
    done: bool,
    map: SharedMap,
    page_size: usize,
    prefix: String,
}

#[async_trait]
impl KeyCursor for MemoryCursor {
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }

        let guard = self.map.read().await;
        let map = guard.as_ref().ok_or(StoreError::Closed)?;

        let lower = match &self.after {
            Some(after) => Bound::Excluded(after.clone()),
            None => Bound::Included(self.prefix.clone()),
        };
        let keys: Vec<String> = map
            .range::<String, _>((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(&self.prefix))
            .take(self.page_size)
            .cloned()
            .collect();

        if keys.len() < self.page_size {
            self.done = true;
        }
        if keys.is_empty() {
            return Ok(None);
        }

        self.after = keys.last().cloned();
        Ok(Some(keys))
    }
}
