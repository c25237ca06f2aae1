//! End-to-end routing of one completion request
//!
//! alias resolution -> catalog -> candidate selection -> fallback loop

use crate::error::{AppError, AppResult};
use crate::metrics::{Metrics, RequestOutcome};
use crate::middleware::RequestId;
use crate::models::alias::{AliasResolver, ResolvedModel};
use crate::models::catalog::CatalogCache;
use crate::router::candidates::CandidateSelector;
use crate::router::fallback::FallbackEngine;
use crate::router::{RoutedCompletion, RoutingRequest};
use std::sync::Arc;

pub struct CompletionRouter {
    catalog: Arc<CatalogCache>,
    aliases: Arc<AliasResolver>,
    selector: CandidateSelector,
    engine: FallbackEngine,
    metrics: Arc<Metrics>,
}

impl CompletionRouter {
    pub fn new(
        catalog: Arc<CatalogCache>,
        aliases: Arc<AliasResolver>,
        selector: CandidateSelector,
        engine: FallbackEngine,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            aliases,
            selector,
            engine,
            metrics,
        }
    }

    pub fn selector(&self) -> &CandidateSelector {
        &self.selector
    }

    /// Route a request to the first candidate that answers
    ///
    /// An unknown model reference is not an error: it is reported as a
    /// warning and the request proceeds in auto mode.
    ///
    /// # Errors
    /// `CatalogUnavailable`, `NoCandidatesAvailable` or `AllCandidatesFailed`.
    pub async fn route(
        &self,
        request: &RoutingRequest,
        request_id: RequestId,
    ) -> AppResult<RoutedCompletion> {
        let mut warnings = Vec::new();

        let resolution = request.model().and_then(|reference| {
            let resolved = self.aliases.resolve(reference);
            match &resolved {
                Some(model) => tracing::debug!(
                    request_id = %request_id,
                    reference = %reference,
                    model = %model.id,
                    source = ?model.source,
                    "Resolved model reference"
                ),
                None => {
                    tracing::warn!(
                        request_id = %request_id,
                        reference = %reference,
                        "Unknown model reference, using automatic selection"
                    );
                    warnings.push(format!(
                        "Unknown model reference '{}'; a model was chosen automatically",
                        reference
                    ));
                }
            }
            resolved
        });

        let result = self.route_resolved(request, request_id, resolution, warnings).await;
        self.record_outcome(&result, request_id);
        result
    }

    async fn route_resolved(
        &self,
        request: &RoutingRequest,
        request_id: RequestId,
        resolution: Option<ResolvedModel>,
        mut warnings: Vec<String>,
    ) -> AppResult<RoutedCompletion> {
        let catalog = self.catalog.get_catalog().await?;
        let selection = self
            .selector
            .select(request, &catalog, resolution.as_ref())?;
        warnings.extend(selection.warnings);

        tracing::info!(
            request_id = %request_id,
            candidate_count = selection.candidates.len(),
            first_candidate = ?selection.candidates.first(),
            has_image = request.has_image(),
            pinned = ?selection.pinned,
            "Routing request"
        );

        let served = self
            .engine
            .run(&selection.candidates, request, request_id)
            .await?;

        let auto_selected = selection.pinned.as_deref() != Some(served.model.as_str());

        Ok(RoutedCompletion {
            content: served.content,
            model: served.model,
            auto_selected,
            failures: served.failures,
            warnings,
        })
    }

    fn record_outcome(&self, result: &AppResult<RoutedCompletion>, request_id: RequestId) {
        let outcome = match result {
            Ok(_) => RequestOutcome::Success,
            Err(AppError::AllCandidatesFailed { .. }) => RequestOutcome::Exhausted,
            Err(AppError::NoCandidatesAvailable { .. }) => RequestOutcome::NoCandidates,
            Err(AppError::CatalogUnavailable { .. }) => RequestOutcome::CatalogUnavailable,
            Err(_) => return,
        };

        if let Err(e) = self.metrics.record_request(outcome) {
            self.metrics.metrics_recording_failure("record_request");
            tracing::error!(
                request_id = %request_id,
                error = %e,
                outcome = outcome.as_str(),
                "Metrics recording failed. Observability degraded but request continues."
            );
        }
    }
}
