//! Models endpoint handler
//!
//! GET /models lists catalog models cheapest first, plus the configured
//! alias names.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::ModelDescriptor;
use crate::models::discovery::{DEFAULT_HTTP_LIMIT, DiscoveryFilter, clamp_limit};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct ModelsQuery {
    pub limit: Option<usize>,
    pub search: Option<String>,
}

/// Response for GET /models
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// Models in the catalog, before the limit is applied
    pub total: usize,
    pub models: Vec<ModelSummary>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub name: String,
    pub context_length: Option<u64>,
    pub prompt_price: Option<f64>,
    pub free: bool,
    pub vision: bool,
}

impl From<&ModelDescriptor> for ModelSummary {
    fn from(model: &ModelDescriptor) -> Self {
        Self {
            id: model.id.clone(),
            name: model.name.clone(),
            context_length: model.context_length,
            prompt_price: model.prompt_price,
            free: model.is_free,
            vision: model.supports_vision,
        }
    }
}

/// GET /models handler
pub async fn handler(
    State(state): State<AppState>,
    Query(query): Query<ModelsQuery>,
) -> Result<Json<ModelsResponse>, AppError> {
    let catalog = state.catalog().get_catalog().await?;

    let filter = DiscoveryFilter {
        search: query.search.filter(|s| !s.trim().is_empty()),
        limit: clamp_limit(query.limit.unwrap_or(DEFAULT_HTTP_LIMIT)),
        ..DiscoveryFilter::default()
    };

    let models: Vec<ModelSummary> = filter
        .apply(&catalog)
        .into_iter()
        .map(ModelSummary::from)
        .collect();

    tracing::debug!(
        total_models = catalog.len(),
        listed = models.len(),
        search = ?filter.search,
        "Listed catalog models"
    );

    Ok(Json(ModelsResponse {
        total: catalog.len(),
        models,
        aliases: state
            .aliases()
            .table()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    }))
}
