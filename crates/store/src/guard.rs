//! Cancellation and deadlines for store operations.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{BoxRouteIterator, IterState, Route, RouteIterator, RouteStore, StoreError, StoreResult};

async fn bounded<T, F>(token: &CancellationToken, timeout: Option<Duration>, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>> + Send,
{
    let timed = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or(Err(StoreError::DeadlineExceeded)),
            None => fut.await,
        }
    };

    tokio::select! {
        biased;
        () = token.cancelled() => Err(StoreError::Cancelled),
        result = timed => result,
    }
}

/// A store whose operations abort on cancellation or after a deadline.
///
/// Aborted operations fail with [`StoreError::Cancelled`] or
/// [`StoreError::DeadlineExceeded`]. `close` is never bounded.
#[derive(Debug)]
pub struct Guarded<S> {
    inner: S,
    timeout: Option<Duration>,
    token: CancellationToken,
}

impl<S: RouteStore> Guarded<S> {
    /// Wrap `inner`, aborting operations once `token` is cancelled.
    pub fn new(inner: S, token: CancellationToken) -> Self {
        Self {
            inner,
            timeout: None,
            token,
        }
    }

    /// Bound every operation, and every iterator step, by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    async fn run<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        bounded(&self.token, self.timeout, fut).await
    }
}

#[async_trait]
impl<S: RouteStore> RouteStore for Guarded<S> {
    async fn get(&self, key: &str) -> StoreResult<Route> {
        self.run(self.inner.get(key)).await
    }

    async fn put(&self, key: &str, route: &Route) -> StoreResult<()> {
        self.run(self.inner.put(key, route)).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.run(self.inner.del(key)).await
    }

    async fn list(&self, prefix: &str) -> StoreResult<BoxRouteIterator> {
        let inner = self.run(self.inner.list(prefix)).await?;

        Ok(Box::new(GuardedIterator {
            error: None,
            inner,
            timeout: self.timeout,
            token: self.token.clone(),
        }))
    }

    async fn next_id(&self) -> StoreResult<u64> {
        self.run(self.inner.next_id()).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.run(self.inner.ping()).await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }
}

/// Iterator returned by [`Guarded::list`].
///
/// A step that is cancelled or times out ends the traversal and records the
/// failure as the iterator's error.
pub struct GuardedIterator {
    error: Option<StoreError>,
    inner: BoxRouteIterator,
    timeout: Option<Duration>,
    token: CancellationToken,
}

#[async_trait]
impl RouteIterator for GuardedIterator {
    async fn next(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }

        let inner = &mut self.inner;
        let step = async move { Ok::<_, StoreError>(inner.next().await) };
        match bounded(&self.token, self.timeout, step).await {
            Ok(advanced) => advanced,
            Err(err) => {
                self.error = Some(err);
                self.inner.release().await;
                false
            }
        }
    }

    fn name(&self) -> Option<&str> {
        if self.error.is_some() {
            return None;
        }
        self.inner.name()
    }

    fn route(&self) -> Option<&Route> {
        if self.error.is_some() {
            return None;
        }
        self.inner.route()
    }

    fn error(&self) -> Option<&StoreError> {
        self.error.as_ref().or_else(|| self.inner.error())
    }

    fn state(&self) -> IterState {
        if self.error.is_some() {
            return IterState::Exhausted;
        }
        self.inner.state()
    }

    async fn release(&mut self) {
        self.inner.release().await;
    }

    fn take_error(&mut self) -> Option<StoreError> {
        self.error.take().or_else(|| self.inner.take_error())
    }
}
