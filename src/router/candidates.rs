//! Candidate selection
//!
//! Builds the ordered [`CandidateList`] for one request:
//! 1. the explicit model, if it resolved and can take the request
//! 2. free models (vision-capable when an image is attached), configured
//!    priority first and catalog order after, up to `max_candidates`
//! 3. the configured default model, if not already present

use crate::config::RoutingConfig;
use crate::error::{AppError, AppResult};
use crate::models::alias::{AliasResolver, ResolutionSource, ResolvedModel};
use crate::models::descriptor::{ModelCatalog, ModelDescriptor};
use crate::router::{CandidateList, RoutingRequest};

/// Default cap on explicit plus auto-selected candidates
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

/// Output of [`CandidateSelector::select`]
#[derive(Debug, Clone)]
pub struct Selection {
    pub candidates: CandidateList,
    /// Explicit model kept as candidate #1, if any
    pub pinned: Option<String>,
    /// Degradations to report back to the caller
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CandidateSelector {
    priority: Vec<String>,
    default_model: Option<String>,
    max_candidates: usize,
}

impl CandidateSelector {
    /// `priority` holds canonical ids; `max_candidates` is raised to at least 1
    pub fn new(priority: Vec<String>, default_model: Option<String>, max_candidates: usize) -> Self {
        Self {
            priority,
            default_model,
            max_candidates: max_candidates.max(1),
        }
    }

    /// Build from the `[routing]` section, resolving priority entries through
    /// the alias table
    ///
    /// Entries that resolve to nothing are dropped with a warning.
    pub fn from_config(routing: &RoutingConfig, aliases: &AliasResolver) -> Self {
        let priority = routing
            .priority()
            .iter()
            .filter_map(|entry| {
                let resolved = aliases.resolve_id(entry);
                if resolved.is_none() {
                    tracing::warn!(
                        entry = %entry,
                        "Ignoring routing priority entry: not an alias or vendor/model identifier"
                    );
                }
                resolved
            })
            .collect();

        Self::new(
            priority,
            routing.default_model().map(str::to_string),
            routing.max_candidates(),
        )
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Produce the candidate list for `request`
    ///
    /// `resolution` is the alias-resolved explicit model, or `None` in auto
    /// mode.
    ///
    /// # Errors
    /// Returns `AppError::NoCandidatesAvailable` if nothing can serve the request.
    pub fn select(
        &self,
        request: &RoutingRequest,
        catalog: &ModelCatalog,
        resolution: Option<&ResolvedModel>,
    ) -> AppResult<Selection> {
        let needs_vision = request.has_image();
        let mut candidates = CandidateList::new();
        let mut pinned = None;
        let mut warnings = Vec::new();

        if let Some(resolved) = resolution {
            match catalog.get(&resolved.id) {
                Some(model) if needs_vision && !model.supports_vision => {
                    tracing::warn!(
                        model = %resolved.id,
                        "Explicit model does not accept images, falling back to vision-capable models"
                    );
                    warnings.push(format!(
                        "Model '{}' does not accept image input; a vision-capable model was chosen instead",
                        resolved.id
                    ));
                }
                Some(_) => {
                    candidates.push(resolved.id.as_str());
                    pinned = Some(resolved.id.clone());
                }
                // Aliases are operator-vetted; send them even if the catalog lags
                None if resolved.source == ResolutionSource::Alias && !needs_vision => {
                    candidates.push(resolved.id.as_str());
                    pinned = Some(resolved.id.clone());
                }
                None => {
                    tracing::warn!(
                        model = %resolved.id,
                        "Explicit model not in catalog, using automatic selection"
                    );
                    warnings.push(format!(
                        "Model '{}' is not in the current catalog; a model was chosen automatically",
                        resolved.id
                    ));
                }
            }
        }

        let eligible = |model: &ModelDescriptor| {
            model.is_free && (!needs_vision || model.supports_vision)
        };

        for id in &self.priority {
            if candidates.len() >= self.max_candidates {
                break;
            }
            if catalog.get(id).is_some_and(eligible) {
                candidates.push(id.as_str());
            }
        }

        for model in catalog.models() {
            if candidates.len() >= self.max_candidates {
                break;
            }
            if eligible(model) {
                candidates.push(model.id.as_str());
            }
        }

        if let Some(default) = &self.default_model {
            let known_incompatible =
                needs_vision && catalog.get(default).is_some_and(|m| !m.supports_vision);
            if known_incompatible {
                tracing::debug!(
                    model = %default,
                    "Skipping default model: catalog says it does not accept images"
                );
            } else {
                candidates.push(default.as_str());
            }
        }

        if candidates.is_empty() {
            let reason = if needs_vision {
                "no free vision-capable model in the catalog and no usable default model"
            } else {
                "no free model in the catalog and no default model configured"
            };
            return Err(AppError::NoCandidatesAvailable {
                reason: reason.to_string(),
            });
        }

        tracing::debug!(
            candidates = ?candidates.as_slice(),
            needs_vision,
            pinned = ?pinned,
            "Selected candidates"
        );

        Ok(Selection {
            candidates,
            pinned,
            warnings,
        })
    }
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(Vec::new(), None, DEFAULT_MAX_CANDIDATES)
    }
}
