//! Process-wide model catalog cache
//!
//! Holds the most recent [`ModelCatalog`] for [`CATALOG_TTL`]. Once the
//! snapshot is stale, the next caller starts a refresh and every concurrent
//! caller awaits that same in-flight fetch, so a burst of requests costs one
//! upstream call. A failed refresh falls back to the stale snapshot, and the
//! stale snapshot is then served without refetching for
//! [`REFRESH_RETRY_COOLDOWN`].

use crate::error::{AppError, AppResult};
use crate::metrics::{Metrics, RefreshResult};
use crate::models::client::CatalogProvider;
use crate::models::descriptor::ModelCatalog;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How long a fetched catalog is served before a refresh is attempted
pub const CATALOG_TTL: Duration = Duration::from_secs(5 * 60);

/// After a failed refresh, a stale snapshot is served as-is for this long
pub const REFRESH_RETRY_COOLDOWN: Duration = Duration::from_secs(30);

/// Source of the current time, injectable so tests can age the cache
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Refresh failure shared between every caller awaiting the same fetch
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct CatalogFetchError(String);

type PendingFetch = Shared<BoxFuture<'static, Result<Arc<ModelCatalog>, CatalogFetchError>>>;

#[derive(Default)]
struct CacheState {
    current: Option<Arc<ModelCatalog>>,
    pending: Option<PendingFetch>,
    last_failure: Option<Instant>,
}

/// Freshness of the cached snapshot, reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogStatus {
    Empty,
    Fresh,
    Stale,
}

impl CatalogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

pub struct CatalogCache {
    provider: Arc<dyn CatalogProvider>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
    metrics: Option<Arc<Metrics>>,
}

impl CatalogCache {
    pub fn new(provider: Arc<dyn CatalogProvider>) -> Self {
        Self::with_clock(provider, Arc::new(SystemClock))
    }

    pub fn with_clock(provider: Arc<dyn CatalogProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            clock,
            ttl: CATALOG_TTL,
            state: Arc::new(Mutex::new(CacheState::default())),
            metrics: None,
        }
    }

    /// Record refresh outcomes in `modelrelay_catalog_refreshes_total`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return a catalog snapshot, refreshing it if stale
    ///
    /// # Errors
    /// Returns `AppError::CatalogUnavailable` only when the refresh fails and
    /// no earlier snapshot exists.
    pub async fn get_catalog(&self) -> AppResult<Arc<ModelCatalog>> {
        let (pending, stale) = {
            let mut state = self.state.lock().await;

            let now = self.clock.now();
            if let Some(current) = &state.current {
                if !current.is_stale(now, self.ttl) {
                    return Ok(Arc::clone(current));
                }
                let cooling_down = state.last_failure.is_some_and(|failed_at| {
                    now.saturating_duration_since(failed_at) < REFRESH_RETRY_COOLDOWN
                });
                if cooling_down {
                    tracing::debug!("Recent catalog refresh failed, serving stale catalog");
                    return Ok(Arc::clone(current));
                }
            }

            let pending = match &state.pending {
                Some(pending) => {
                    tracing::debug!("Joining in-flight catalog refresh");
                    pending.clone()
                }
                None => {
                    let pending = self.start_refresh();
                    state.pending = Some(pending.clone());
                    pending
                }
            };
            (pending, state.current.clone())
        };

        match pending.await {
            Ok(catalog) => Ok(catalog),
            Err(e) => match stale {
                Some(stale) => {
                    tracing::warn!(
                        error = %e,
                        age_seconds = stale.age(self.clock.now()).as_secs(),
                        "Catalog refresh failed, serving stale catalog"
                    );
                    Ok(stale)
                }
                None => Err(AppError::CatalogUnavailable {
                    reason: e.to_string(),
                }),
            },
        }
    }

    /// Current snapshot without triggering a refresh
    pub async fn snapshot(&self) -> Option<Arc<ModelCatalog>> {
        self.state.lock().await.current.clone()
    }

    pub async fn status(&self) -> CatalogStatus {
        match self.snapshot().await {
            None => CatalogStatus::Empty,
            Some(catalog) if catalog.is_stale(self.clock.now(), self.ttl) => CatalogStatus::Stale,
            Some(_) => CatalogStatus::Fresh,
        }
    }

    /// Build the shared refresh future
    ///
    /// The future installs its own result: it clears `pending` and, on
    /// success, replaces `current`. It runs once no matter how many callers
    /// await it.
    fn start_refresh(&self) -> PendingFetch {
        let provider = Arc::clone(&self.provider);
        let clock = Arc::clone(&self.clock);
        let state = Arc::clone(&self.state);
        let metrics = self.metrics.clone();

        async move {
            tracing::debug!("Refreshing model catalog");
            let result = provider.list_models().await;

            let mut state = state.lock().await;
            state.pending = None;

            let outcome = match result {
                Ok(records) => {
                    let catalog = Arc::new(ModelCatalog::from_records(records, clock.now()));
                    tracing::info!(
                        model_count = catalog.len(),
                        free_count = catalog.models().iter().filter(|m| m.is_free).count(),
                        "Model catalog refreshed"
                    );
                    state.current = Some(Arc::clone(&catalog));
                    state.last_failure = None;
                    Ok(catalog)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Model catalog refresh failed");
                    state.last_failure = Some(clock.now());
                    Err(CatalogFetchError(e.to_string()))
                }
            };

            if let Some(metrics) = metrics {
                let result = if outcome.is_ok() {
                    RefreshResult::Success
                } else {
                    RefreshResult::Error
                };
                if let Err(e) = metrics.record_catalog_refresh(result) {
                    tracing::error!(error = %e, "Failed to record catalog refresh metric");
                    metrics.metrics_recording_failure("record_catalog_refresh");
                }
            }

            outcome
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::client::UpstreamError;
    use crate::models::descriptor::RawModel;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        calls: AtomicUsize,
        responses: StdMutex<Vec<Result<Vec<RawModel>, UpstreamError>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<Vec<RawModel>, UpstreamError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: StdMutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl CatalogProvider for ScriptedProvider {
        async fn list_models(&self) -> Result<Vec<RawModel>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(UpstreamError::Transport("script exhausted".to_string()));
            }
            responses.remove(0)
        }
    }

    struct FixedClock(StdMutex<Instant>);

    impl FixedClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    #[tokio::test]
    async fn test_fresh_catalog_is_served_from_cache() {
        let provider = ScriptedProvider::new(vec![Ok(vec![RawModel::new("a/one")])]);
        let cache = CatalogCache::new(provider.clone());

        let first = cache.get_catalog().await.unwrap();
        let second = cache.get_catalog().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.status().await, CatalogStatus::Fresh);
    }

    #[tokio::test]
    async fn test_failure_without_snapshot_is_catalog_unavailable() {
        let provider = ScriptedProvider::new(vec![Err(UpstreamError::Status {
            status: 500,
            body: "boom".to_string(),
        })]);
        let cache = CatalogCache::new(provider);

        let err = cache.get_catalog().await.unwrap_err();
        assert!(matches!(err, AppError::CatalogUnavailable { .. }));
        assert_eq!(cache.status().await, CatalogStatus::Empty);
    }

    #[tokio::test]
    async fn test_stale_snapshot_survives_failed_refresh() {
        let provider = ScriptedProvider::new(vec![
            Ok(vec![RawModel::new("a/one")]),
            Err(UpstreamError::Transport("connection reset".to_string())),
            Ok(vec![RawModel::new("b/two")]),
        ]);
        let clock = Arc::new(FixedClock(StdMutex::new(Instant::now())));
        let cache = CatalogCache::with_clock(provider.clone(), clock.clone());

        let first = cache.get_catalog().await.unwrap();
        clock.advance(CATALOG_TTL + Duration::from_secs(1));
        assert_eq!(cache.status().await, CatalogStatus::Stale);

        let stale = cache.get_catalog().await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale), "failed refresh should serve stale catalog");

        // Still stale, so the next call retries and picks up the new snapshot
        let refreshed = cache.get_catalog().await.unwrap();
        assert!(refreshed.get("b/two").is_some());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
