//! RocksDB route store implementation
//!
//! Routes are stored as JSON values keyed by their short name. Prefix
//! listings are native range scans over `[prefix, prefix_end(prefix))`, read
//! a page at a time so no RocksDB iterator outlives a single batch.

pub mod config;

pub use config::RocksDbStoreOptions;

use std::sync::Arc;

use async_trait::async_trait;
use golink_store::{
    BoxRouteIterator, KeyCursor, NEXT_ID_KEY, Route, RouteLookup, RouteStore, ScanIterator,
    StoreError, StoreResult, check_route, check_route_key, prefix_end,
};
use parking_lot::RwLock;
use rocksdb::{
    Direction, ErrorKind, IteratorMode, MultiThreaded, OptimisticTransactionDB, Options,
    ReadOptions,
};
use tracing::{debug, info, warn};

type Db = OptimisticTransactionDB<MultiThreaded>;

/// RocksDB route store
#[derive(Clone)]
pub struct RocksDbStore {
    /// The RocksDB instance, `None` once closed
    db: Arc<RwLock<Option<Arc<Db>>>>,
    /// Keys read per listing page
    page_size: usize,
}

impl RocksDbStore {
    /// Open (creating if missing) the database described by `options`
    pub async fn new(options: RocksDbStoreOptions) -> StoreResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);

        let db = Db::open(&db_opts, &options.path)
            .map_err(|e| StoreError::Backend(format!("Failed to open RocksDB: {e}")))?;

        let store = Self {
            db: Arc::new(RwLock::new(Some(Arc::new(db)))),
            page_size: options.page_size,
        };
        store.ping().await?;

        info!(path = %options.path.display(), "opened RocksDB route store");
        Ok(store)
    }

    fn db(&self) -> StoreResult<Arc<Db>> {
        self.db.read().clone().ok_or(StoreError::Closed)
    }

    /// Store raw bytes under `key`, bypassing route encoding
    pub fn put_raw(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.db()?
            .put(key.as_bytes(), value)
            .map_err(|e| StoreError::Backend(format!("Failed to put value: {e}")))
    }

    /// One compare-and-swap attempt on the counter.
    ///
    /// Optimistic transactions detect a concurrent writer at commit time;
    /// `None` means this attempt lost and must be retried.
    fn try_increment(db: &Db) -> StoreResult<Option<u64>> {
        let txn = db.transaction();
        let current = txn
            .get_for_update(NEXT_ID_KEY, true)
            .map_err(|e| StoreError::Backend(format!("Failed to read counter: {e}")))?
            .map_or(Ok(0), |raw| Self::parse_counter(&raw))?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend("Counter overflow".to_string()))?;

        txn.put(NEXT_ID_KEY, next.to_string())
            .map_err(|e| StoreError::Backend(format!("Failed to write counter: {e}")))?;

        match txn.commit() {
            Ok(()) => Ok(Some(next)),
            Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => Ok(None),
            Err(e) => Err(StoreError::Backend(format!(
                "Failed to commit counter: {e}"
            ))),
        }
    }

    fn parse_counter(raw: &[u8]) -> StoreResult<u64> {
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreError::Backend("Counter value is not an integer".to_string()))
    }
}

#[async_trait]
impl RouteStore for RocksDbStore {
    async fn get(&self, key: &str) -> StoreResult<Route> {
        let db = self.db()?;

        if key == NEXT_ID_KEY {
            return Err(StoreError::NotFound(key.to_string()));
        }

        match db.get(key.as_bytes()) {
            Ok(Some(value)) => Route::decode(key, &value).inspect_err(|e| warn!(key, "{e}")),
            Ok(None) => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(StoreError::Backend(format!("Failed to get route: {e}"))),
        }
    }

    async fn put(&self, key: &str, route: &Route) -> StoreResult<()> {
        check_route(key, route)?;
        self.put_raw(key, &route.encode()?)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        check_route_key(key)?;

        self.db()?
            .delete(key.as_bytes())
            .map_err(|e| StoreError::Backend(format!("Failed to delete route: {e}")))?;

        debug!(key, "route deleted");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<BoxRouteIterator> {
        let cursor = RangeCursor {
            after: None,
            db: self.db()?,
            done: false,
            page_size: self.page_size,
            prefix: prefix.as_bytes().to_vec(),
            upper: prefix_end(prefix.as_bytes()),
        };

        Ok(Box::new(ScanIterator::new(cursor, self.clone(), prefix)))
    }

    async fn next_id(&self) -> StoreResult<u64> {
        let db = self.db()?;

        loop {
            if let Some(next) = Self::try_increment(&db)? {
                return Ok(next);
            }
            debug!("counter update conflicted, retrying");
            tokio::task::yield_now().await;
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.db()?
            .property_value("rocksdb.estimate-num-keys")
            .map(|_| ())
            .map_err(|e| StoreError::Backend(format!("RocksDB is not readable: {e}")))
    }

    async fn close(&self) -> StoreResult<()> {
        let Some(db) = self.db.write().take() else {
            return Ok(());
        };

        // Flush the database to ensure all data is persisted
        db.flush()
            .map_err(|e| StoreError::Backend(format!("Failed to flush database: {e}")))?;

        info!(
            "RocksDB route store closed, Arc strong count: {}",
            Arc::strong_count(&db)
        );
        Ok(())
    }
}

#[async_trait]
impl RouteLookup for RocksDbStore {
    async fn lookup(&self, key: &str) -> StoreResult<Route> {
        self.get(key).await
    }
}

impl std::fmt::Debug for RocksDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RocksDbStore")
    }
}

/// One bounded range scan per page, resuming after the last key returned.
struct RangeCursor {
    after: Option<Vec<u8>>,
    db: Arc<Db>,
    done: bool,
    page_size: usize,
    prefix: Vec<u8>,
    upper: Option<Vec<u8>>,
}

#[async_trait]
impl KeyCursor for RangeCursor {
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }

        let mut read_opts = ReadOptions::default();
        if let Some(upper) = &self.upper {
            read_opts.set_iterate_upper_bound(upper.clone());
        }
        let start = self.after.as_deref().unwrap_or(&self.prefix);
        let iter = self
            .db
            .iterator_opt(IteratorMode::From(start, Direction::Forward), read_opts);

        let mut keys = Vec::with_capacity(self.page_size);
        let mut last = None;
        let mut full = false;
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Backend(format!("Iterator error: {e}")))?;

            // The seek is inclusive; the previous page already returned it
            if self.after.as_deref() == Some(&*key) {
                continue;
            }

            match std::str::from_utf8(&key) {
                Ok(name) => keys.push(name.to_string()),
                Err(_) => warn!(key = ?key, "skipping non UTF-8 key"),
            }
            last = Some(key.to_vec());

            if keys.len() == self.page_size {
                full = true;
                break;
            }
        }

        if !full {
            self.done = true;
        }
        if let Some(last) = last {
            self.after = Some(last);
        }

        if keys.is_empty() && self.done {
            return Ok(None);
        }
        Ok(Some(keys))
    }

    async fn release(&mut self) {
        self.done = true;
    }
}
