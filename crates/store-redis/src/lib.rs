//! Implementation of the route store using Redis.
//!
//! Routes are JSON strings keyed by their short name. Listings walk `SCAN`
//! with a `MATCH` pattern until the server reports cursor `0`; keys may be
//! returned more than once and in no particular order.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod options;

pub use options::{DEFAULT_SCAN_COUNT, RedisStoreOptions};

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use async_trait::async_trait;
use golink_store::{
    BoxRouteIterator, KeyCursor, NEXT_ID_KEY, Route, RouteLookup, RouteStore, ScanIterator,
    StoreError, StoreResult, check_route, check_route_key,
};
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tracing::{debug, info, warn};

fn backend(context: &'static str) -> impl FnOnce(RedisError) -> StoreError {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

/// Escape glob metacharacters so `prefix` matches literally in `MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

/// Route store using Redis.
#[derive(Clone)]
pub struct RedisStore {
    /// `None` once closed.
    conn: Arc<RwLock<Option<ConnectionManager>>>,
    debug: bool,
    scan_count: usize,
}

impl RedisStore {
    /// Connects to the server described by `options` and pings it.
    pub async fn new(options: RedisStoreOptions) -> StoreResult<Self> {
        let url = options.connection_url()?;
        let client = redis::Client::open(url.as_str()).map_err(backend("invalid redis url"))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(backend("failed to connect to redis"))?;

        let store = Self {
            conn: Arc::new(RwLock::new(Some(conn))),
            debug: options.debug,
            scan_count: options.scan_count.max(1),
        };
        store.ping().await?;

        info!(addr = %options.addr, "connected to redis route store");
        Ok(store)
    }

    fn connection(&self) -> StoreResult<ConnectionManager> {
        self.conn.read().clone().ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl RouteStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Route> {
        let mut conn = self.connection()?;

        if key == NEXT_ID_KEY {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let value: Option<Vec<u8>> = conn.get(key).await.map_err(backend("GET failed"))?;
        if self.debug {
            debug!(key, found = value.is_some(), "GET");
        }

        match value {
            Some(bytes) => Route::decode(key, &bytes).inspect_err(|e| warn!(key, "{e}")),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn put(&self, key: &str, route: &Route) -> StoreResult<()> {
        check_route(key, route)?;
        let bytes = route.encode()?;

        let mut conn = self.connection()?;
        conn.set::<_, _, ()>(key, &bytes[..])
            .await
            .map_err(backend("SET failed"))?;

        if self.debug {
            debug!(key, "SET");
        }
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        check_route_key(key)?;

        let mut conn = self.connection()?;
        let removed: u64 = conn.del(key).await.map_err(backend("DEL failed"))?;

        if self.debug {
            debug!(key, removed, "DEL");
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<BoxRouteIterator> {
        let cursor = ScanCursor {
            conn: Some(self.connection()?),
            count: self.scan_count,
            debug: self.debug,
            done: false,
            pattern: escape_glob(prefix),
            position: 0,
        };

        Ok(Box::new(
            ScanIterator::new(cursor, self.clone(), prefix).deduplicate(),
        ))
    }

    async fn next_id(&self) -> StoreResult<u64> {
        let mut conn = self.connection()?;
        let next: u64 = conn
            .incr(NEXT_ID_KEY, 1)
            .await
            .map_err(backend("INCR failed"))?;

        if self.debug {
            debug!(next, "INCR");
        }
        Ok(next)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection()?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend("PING failed"))?;

        debug!(%pong, "redis ping");
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        if self.conn.write().take().is_some() {
            info!("redis route store closed");
        }
        Ok(())
    }
}

#[async_trait]
impl RouteLookup for RedisStore {
    async fn lookup(&self, key: &str) -> StoreResult<Route> {
        self.get(key).await
    }
}

impl Debug for RedisStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RedisStore")
            .field("debug", &self.debug)
            .field("scan_count", &self.scan_count)
            .finish_non_exhaustive()
    }
}

/// Walks `SCAN` until the server hands back cursor `0`.
struct ScanCursor {
    conn: Option<ConnectionManager>,
    count: usize,
    debug: bool,
    done: bool,
    pattern: String,
    position: u64,
}

impl ScanCursor {
    /// Record the cursor the server returned. `0` ends the scan; any other
    /// value, even after an empty batch, means more keys may follow.
    const fn advance(&mut self, next: u64) {
        self.position = next;
        if next == 0 {
            self.done = true;
        }
    }
}

#[async_trait]
impl KeyCursor for ScanCursor {
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;

        let (next, raw): (u64, Vec<Vec<u8>>) = redis::cmd("SCAN")
            .arg(self.position)
            .arg("MATCH")
            .arg(&self.pattern)
            .arg("COUNT")
            .arg(self.count)
            .query_async(conn)
            .await
            .map_err(backend("SCAN failed"))?;

        if self.debug {
            debug!(cursor = self.position, next, batch = raw.len(), "SCAN");
        }

        self.advance(next);

        let keys = raw
            .into_iter()
            .filter_map(|key| match String::from_utf8(key) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!(key = ?e.as_bytes(), "skipping non UTF-8 key");
                    None
                }
            })
            .collect();
        Ok(Some(keys))
    }

    async fn release(&mut self) {
        self.done = true;
        self.conn = None;
    }
}
