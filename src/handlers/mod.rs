//! HTTP request handlers for the modelrelay tool surface

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::image::ImageGenerator;
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::models::{
    AliasResolver, CatalogCache, CatalogProvider, Clock, CompletionProvider, OpenRouterClient,
    SystemClock,
};
use crate::router::{CandidateSelector, CompletionRouter, FallbackEngine};
use crate::shared::{CompletionExecutor, RetryPolicy};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod chat;
pub mod health;
pub mod images;
pub mod metrics;
pub mod models;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers. The catalog
/// cache is the only process-wide mutable state.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    router: Arc<CompletionRouter>,
    catalog: Arc<CatalogCache>,
    aliases: Arc<AliasResolver>,
    images: Arc<ImageGenerator>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Create AppState backed by the OpenRouter client
    ///
    /// # Errors
    /// Returns `AppError::Config` if no API key is configured, or
    /// `AppError::Internal` if the HTTP client or metrics registry cannot be
    /// built.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let client = Arc::new(OpenRouterClient::new(
            &config.upstream,
            config.request_timeout(),
        )?);
        Self::with_providers(config, client.clone(), client, Arc::new(SystemClock))
    }

    /// Create AppState with explicit upstream providers and clock
    pub fn with_providers(
        config: Arc<Config>,
        catalog_provider: Arc<dyn CatalogProvider>,
        completion_provider: Arc<dyn CompletionProvider>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to initialize metrics: {}", e))
        })?);

        let catalog = Arc::new(
            CatalogCache::with_clock(catalog_provider, clock).with_metrics(metrics.clone()),
        );
        let aliases = Arc::new(AliasResolver::new(config.alias_table()));

        let policy = RetryPolicy::new(config.routing.transient_backoff_ms())
            .map_err(|e| AppError::Config(e.to_string()))?;
        let executor = CompletionExecutor::new(completion_provider, config.request_timeout());
        let engine = FallbackEngine::new(executor, policy, metrics.clone());
        let selector = CandidateSelector::from_config(&config.routing, &aliases);

        let router = Arc::new(CompletionRouter::new(
            catalog.clone(),
            aliases.clone(),
            selector,
            engine,
            metrics.clone(),
        ));
        let images = Arc::new(ImageGenerator::new(&config.images));

        tracing::debug!(
            aliases = aliases.table().len(),
            max_candidates = router.selector().max_candidates(),
            default_model = ?router.selector().default_model(),
            "Application state initialized"
        );

        Ok(Self {
            config,
            router,
            catalog,
            aliases,
            images,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> &CompletionRouter {
        &self.router
    }

    pub fn catalog(&self) -> &CatalogCache {
        &self.catalog
    }

    pub fn aliases(&self) -> &AliasResolver {
        &self.aliases
    }

    pub fn images(&self) -> &ImageGenerator {
        &self.images
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Build the HTTP application
///
/// Request ids are attached before tracing so every span can carry one.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::handler))
        .route("/models", get(models::handler))
        .route("/images", post(images::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http()),
        )
}
