//! Implementation of the route store using MongoDB.
//!
//! Each route is one document `{_id: <key>, url, time}`. Prefix listings are
//! range queries on `_id`, paged by resuming after the last key returned.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod options;

pub use options::{DEFAULT_COLLECTION, DEFAULT_DATABASE, DEFAULT_PAGE_SIZE, MongoStoreOptions};

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use golink_store::{
    BoxRouteIterator, KeyCursor, NEXT_ID_KEY, Route, RouteLookup, RouteStore, ScanIterator,
    StoreError, StoreResult, check_route, check_route_key, prefix_end_str,
};
use mongodb::bson::{Bson, Document, doc, from_document, to_document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

const DUPLICATE_KEY: i32 = 11000;

fn backend(context: &'static str) -> impl FnOnce(MongoError) -> StoreError {
    move |e| StoreError::Backend(format!("{context}: {e}"))
}

fn is_duplicate_key(e: &MongoError) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Command(c) => c.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(w)) => w.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[derive(Clone)]
struct Handles {
    client: Client,
    database: Database,
    routes: Collection<Document>,
}

/// Route store using a MongoDB collection.
#[derive(Clone)]
pub struct MongoStore {
    /// `None` once closed.
    handles: Arc<RwLock<Option<Handles>>>,
    page_size: usize,
}

impl MongoStore {
    /// Connects to the deployment described by `options` and pings it.
    pub async fn new(options: MongoStoreOptions) -> StoreResult<Self> {
        let client = Client::with_uri_str(&options.uri)
            .await
            .map_err(backend("failed to connect to mongodb"))?;
        let database = client.database(&options.database);
        let routes = database.collection::<Document>(&options.collection);

        let store = Self {
            handles: Arc::new(RwLock::new(Some(Handles {
                client,
                database,
                routes,
            }))),
            page_size: options.page_size.max(1),
        };
        store.ping().await?;

        info!(
            database = %options.database,
            collection = %options.collection,
            "connected to mongodb route store"
        );
        Ok(store)
    }

    fn handles(&self) -> StoreResult<Handles> {
        self.handles.read().clone().ok_or(StoreError::Closed)
    }

    fn routes(&self) -> StoreResult<Collection<Document>> {
        Ok(self.handles()?.routes)
    }

    /// Stores an arbitrary document under `key`, bypassing route encoding.
    pub async fn put_raw(&self, key: &str, mut document: Document) -> StoreResult<()> {
        document.insert("_id", key);
        self.routes()?
            .replace_one(doc! { "_id": key }, document)
            .upsert(true)
            .await
            .map_err(backend("failed to store document"))?;
        Ok(())
    }

    async fn increment(routes: &Collection<Document>) -> Result<Option<Document>, MongoError> {
        routes
            .find_one_and_update(
                doc! { "_id": NEXT_ID_KEY },
                doc! { "$inc": { "value": 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
    }
}

#[async_trait]
impl RouteStore for MongoStore {
    async fn get(&self, key: &str) -> StoreResult<Route> {
        let routes = self.routes()?;

        if key == NEXT_ID_KEY {
            return Err(StoreError::NotFound(key.to_string()));
        }

        let Some(document) = routes
            .find_one(doc! { "_id": key })
            .await
            .map_err(backend("failed to find route"))?
        else {
            return Err(StoreError::NotFound(key.to_string()));
        };

        let route: Route = from_document(document)
            .map_err(|e| StoreError::decode(key, e))
            .inspect_err(|e| warn!(key, "{e}"))?;
        if route.destination.is_empty() {
            return Err(StoreError::decode(key, "route has an empty url"));
        }
        Ok(route)
    }

    async fn put(&self, key: &str, route: &Route) -> StoreResult<()> {
        check_route(key, route)?;
        let document = to_document(route)
            .map_err(|e| StoreError::Backend(format!("failed to encode route: {e}")))?;
        self.put_raw(key, document).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        check_route_key(key)?;

        let result = self
            .routes()?
            .delete_one(doc! { "_id": key })
            .await
            .map_err(backend("failed to delete route"))?;

        debug!(key, deleted = result.deleted_count, "route deleted");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StoreResult<BoxRouteIterator> {
        let cursor = IdRangeCursor {
            after: None,
            done: false,
            page_size: i64::try_from(self.page_size).unwrap_or(i64::MAX),
            prefix: prefix.to_string(),
            routes: Some(self.routes()?),
            upper: prefix_end_str(prefix),
        };

        Ok(Box::new(ScanIterator::new(cursor, self.clone(), prefix)))
    }

    async fn next_id(&self) -> StoreResult<u64> {
        let routes = self.routes()?;

        // Two first-ever upserts can race on the unique `_id`; the loser
        // retries against the document the winner created.
        let updated = match Self::increment(&routes).await {
            Err(e) if is_duplicate_key(&e) => {
                debug!("counter upsert raced, retrying");
                Self::increment(&routes).await
            }
            other => other,
        }
        .map_err(backend("failed to increment counter"))?;

        let value = updated.as_ref().and_then(|d| d.get("value"));
        match value {
            Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
            Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
            _ => None,
        }
        .ok_or_else(|| StoreError::Backend(format!("counter value is not an integer: {value:?}")))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.handles()?
            .database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(backend("mongodb ping failed"))?;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        let Some(handles) = self.handles.write().take() else {
            return Ok(());
        };

        handles.client.shutdown().await;
        info!("mongodb route store closed");
        Ok(())
    }
}

#[async_trait]
impl RouteLookup for MongoStore {
    async fn lookup(&self, key: &str) -> StoreResult<Route> {
        self.get(key).await
    }
}

impl std::fmt::Debug for MongoStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoStore")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

/// Key-only `_id` range queries, one page per batch.
struct IdRangeCursor {
    after: Option<String>,
    done: bool,
    page_size: i64,
    prefix: String,
    routes: Option<Collection<Document>>,
    upper: Option<String>,
}

impl IdRangeCursor {
    fn filter(&self) -> Document {
        let mut range = match &self.after {
            Some(after) => doc! { "$gt": after.as_str() },
            None => doc! { "$gte": self.prefix.as_str() },
        };
        if let Some(upper) = &self.upper {
            range.insert("$lt", upper.as_str());
        }
        doc! { "_id": range }
    }
}

#[async_trait]
impl KeyCursor for IdRangeCursor {
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<String>>> {
        if self.done {
            return Ok(None);
        }
        let routes = self.routes.as_ref().ok_or(StoreError::Closed)?;

        let page: Vec<Document> = routes
            .find(self.filter())
            .sort(doc! { "_id": 1 })
            .limit(self.page_size)
            .projection(doc! { "_id": 1 })
            .await
            .map_err(backend("failed to query routes"))?
            .try_collect()
            .await
            .map_err(backend("failed to read route page"))?;

        if i64::try_from(page.len()).unwrap_or(i64::MAX) < self.page_size {
            self.done = true;
        }

        let keys: Vec<String> = page
            .iter()
            .filter_map(|d| d.get_str("_id").ok())
            .map(str::to_string)
            .collect();
        if keys.is_empty() {
            self.done = true;
            return Ok(None);
        }

        self.after = keys.last().cloned();
        Ok(Some(keys))
    }

    async fn release(&mut self) {
        self.done = true;
        self.routes = None;
    }
}
