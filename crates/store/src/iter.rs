//! Cursor-driven route iteration.

use std::collections::{BTreeMap, HashSet, VecDeque};

use async_trait::async_trait;
use tracing::debug;

use crate::{NEXT_ID_KEY, Route, StoreError, StoreResult};

/// Where an iterator is in its traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterState {
    /// Created, nothing fetched yet.
    Ready,
    /// A current key and route are available.
    Positioned,
    /// Terminal. No more data, or a fault was recorded.
    Exhausted,
}

/// A lazy sequence of routes.
///
/// Not safe for concurrent use; callers sharing an iterator must
/// synchronize externally.
#[async_trait]
pub trait RouteIterator: Send {
    /// Advance to the next route. Returns `false` once exhausted or after a
    /// fault, which is then available from [`RouteIterator::error`].
    async fn next(&mut self) -> bool;

    /// Key of the current route.
    fn name(&self) -> Option<&str>;

    /// The current route.
    fn route(&self) -> Option<&Route>;

    /// Last fault recorded by the traversal.
    fn error(&self) -> Option<&StoreError>;

    /// Current position in the state machine.
    fn state(&self) -> IterState;

    /// Release backend resources held by the traversal. Idempotent.
    async fn release(&mut self);

    /// Drain the remaining routes into a map.
    ///
    /// The iterator is released whether or not the traversal succeeds.
    async fn collect_routes(&mut self) -> StoreResult<BTreeMap<String, Route>> {
        let mut routes = BTreeMap::new();
        while self.next().await {
            if let (Some(name), Some(route)) = (self.name(), self.route()) {
                routes.insert(name.to_string(), route.clone());
            }
        }
        self.release().await;

        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(routes),
        }
    }

    /// Move the recorded fault out of the iterator.
    fn take_error(&mut self) -> Option<StoreError>;
}

/// A backend's native key enumeration.
#[async_trait]
pub trait KeyCursor: Send {
    /// Fetch the next batch of candidate keys, or `None` once the native
    /// cursor reports completion. Batches may be empty.
    async fn next_batch(&mut self) -> StoreResult<Option<Vec<String>>>;

    /// Drop any connection or handle owned by the cursor.
    async fn release(&mut self) {}
}

/// Resolves an enumerated key to its route.
#[async_trait]
pub trait RouteLookup: Send + Sync {
    /// Fetch the route for `key`, as [`crate::RouteStore::get`] does.
    async fn lookup(&self, key: &str) -> StoreResult<Route>;
}

/// The common iterator state machine over a [`KeyCursor`].
pub struct ScanIterator<C, L> {
    batch: VecDeque<String>,
    current: Option<(String, Route)>,
    cursor: C,
    error: Option<StoreError>,
    lookup: L,
    prefix: String,
    released: bool,
    seen: Option<HashSet<String>>,
    state: IterState,
}

impl<C: KeyCursor, L: RouteLookup> ScanIterator<C, L> {
    /// Iterate the keys produced by `cursor` that start with `prefix`.
    pub fn new(cursor: C, lookup: L, prefix: impl Into<String>) -> Self {
        Self {
            batch: VecDeque::new(),
            current: None,
            cursor,
            error: None,
            lookup,
            prefix: prefix.into(),
            released: false,
            seen: None,
            state: IterState::Ready,
        }
    }

    /// Suppress keys the cursor yields more than once.
    ///
    /// Needed for cursors that may resend keys across batches. Remembers
    /// every visited key for the life of the traversal.
    #[must_use]
    pub fn deduplicate(mut self) -> Self {
        self.seen = Some(HashSet::new());
        self
    }

    fn wanted(&mut self, key: &str) -> bool {
        if key == NEXT_ID_KEY || !key.starts_with(&self.prefix) {
            return false;
        }

        match &mut self.seen {
            Some(seen) => seen.insert(key.to_string()),
            None => true,
        }
    }

    async fn finish(&mut self, error: Option<StoreError>) {
        self.current = None;
        self.batch.clear();
        self.state = IterState::Exhausted;
        if error.is_some() {
            self.error = error;
        }
        self.release_cursor().await;
    }

    async fn release_cursor(&mut self) {
        if !self.released {
            self.released = true;
            self.cursor.release().await;
        }
    }
}

#[async_trait]
impl<C: KeyCursor, L: RouteLookup> RouteIterator for ScanIterator<C, L> {
    async fn next(&mut self) -> bool {
        if self.state == IterState::Exhausted {
            return false;
        }
        self.current = None;

        loop {
            let Some(key) = self.batch.pop_front() else {
                match self.cursor.next_batch().await {
                    Ok(Some(keys)) => {
                        self.batch.extend(keys);
                        continue;
                    }
                    Ok(None) => {
                        self.finish(None).await;
                        return false;
                    }
                    Err(err) => {
                        self.finish(Some(err)).await;
                        return false;
                    }
                }
            };

            if !self.wanted(&key) {
                continue;
            }

            match self.lookup.lookup(&key).await {
                Ok(route) => {
                    self.current = Some((key, route));
                    self.state = IterState::Positioned;
                    return true;
                }
                Err(err) if err.is_not_found() => {
                    debug!(%key, "route removed during scan, skipping");
                }
                Err(err) => {
                    self.finish(Some(err)).await;
                    return false;
                }
            }
        }
    }

    fn name(&self) -> Option<&str> {
        self.current.as_ref().map(|(key, _)| key.as_str())
    }

    fn route(&self) -> Option<&Route> {
        self.current.as_ref().map(|(_, route)| route)
    }

    fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    fn state(&self) -> IterState {
        self.state
    }

    async fn release(&mut self) {
        self.current = None;
        self.batch.clear();
        self.state = IterState::Exhausted;
        self.release_cursor().await;
    }

    fn take_error(&mut self) -> Option<StoreError> {
        self.error.take()
    }
}
