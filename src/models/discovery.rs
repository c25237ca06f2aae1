//! Free and low-cost model discovery
//!
//! Backs both the `modelrelay models` subcommand and `GET /models`.

use crate::models::descriptor::{ModelCatalog, ModelDescriptor};
use std::cmp::Ordering;

/// Default number of models printed by the CLI
pub const DEFAULT_CLI_LIMIT: usize = 20;

/// Default number of models returned by `GET /models`
pub const DEFAULT_HTTP_LIMIT: usize = 10;

/// Upper bound for any listing
pub const MAX_LIMIT: usize = 100;

/// Clamp a requested listing size to `1..=MAX_LIMIT`
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_LIMIT)
}

/// Filter applied to the catalog before listing
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
    pub free_only: bool,
    /// Inclusive prompt price ceiling; models with unknown price never match
    pub max_prompt: Option<f64>,
    pub vision_only: bool,
    /// Case-insensitive substring matched against id and name
    pub search: Option<String>,
    pub limit: usize,
}

impl DiscoveryFilter {
    /// Matching models, cheapest first, unknown prices last, truncated to the
    /// clamped limit
    ///
    /// Ties keep catalog order.
    pub fn apply<'a>(&self, catalog: &'a ModelCatalog) -> Vec<&'a ModelDescriptor> {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matches: Vec<&ModelDescriptor> = catalog
            .models()
            .iter()
            .filter(|m| !self.free_only || m.is_free)
            .filter(|m| !self.vision_only || m.supports_vision)
            .filter(|m| match self.max_prompt {
                Some(max) => m.prompt_price.is_some_and(|price| price <= max),
                None => true,
            })
            .filter(|m| match &search {
                Some(needle) => {
                    m.id.to_lowercase().contains(needle) || m.name.to_lowercase().contains(needle)
                }
                None => true,
            })
            .collect();

        matches.sort_by(|a, b| compare_price(a.prompt_price, b.prompt_price));
        matches.truncate(clamp_limit(self.limit));
        matches
    }
}

fn compare_price(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Render the numbered discovery summary printed by the CLI
pub fn format_summary(models: &[&ModelDescriptor], filter: &DiscoveryFilter) -> String {
    let mut lines = vec!["[OpenRouter Model Hunter]".to_string(), String::new()];

    if filter.free_only {
        lines.push("Free models (prompt price = 0):".to_string());
    } else if let Some(max) = filter.max_prompt {
        lines.push(format!("Models with prompt price <= {}: (cheapest first)", max));
    } else {
        lines.push("Cheapest models (by prompt price):".to_string());
    }

    for (idx, model) in models.iter().enumerate() {
        let context = model
            .context_length
            .map(|c| c.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let price = model
            .prompt_price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        lines.push(format!(
            "{}. {} (context: {}, prompt: {})",
            idx + 1,
            model.id,
            context,
            price
        ));
    }

    let free_count = models.iter().filter(|m| m.is_free).count();
    lines.push(String::new());
    lines.push(format!(
        "Total listed: {} (free: {})",
        models.len(),
        free_count
    ));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::descriptor::RawModel;
    use std::time::Instant;

    fn catalog() -> ModelCatalog {
        ModelCatalog::from_records(
            vec![
                RawModel::new("x/unknown-price"),
                RawModel::new("x/pricey").with_prompt_price("0.00002"),
                RawModel::new("x/free-a").with_prompt_price("0").with_context_length(8192),
                RawModel::new("x/cheap").with_prompt_price("0.0000001"),
                RawModel::new("y/free-b")
                    .with_prompt_price("0")
                    .with_input_modalities(&["text", "image"]),
            ],
            Instant::now(),
        )
    }

    fn ids(models: &[&ModelDescriptor]) -> Vec<String> {
        models.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_sorts_cheapest_first_with_unknown_last() {
        let catalog = catalog();
        let filter = DiscoveryFilter {
            limit: 20,
            ..Default::default()
        };
        assert_eq!(
            ids(&filter.apply(&catalog)),
            vec!["x/free-a", "y/free-b", "x/cheap", "x/pricey", "x/unknown-price"]
        );
    }

    #[test]
    fn test_free_only_and_max_prompt() {
        let catalog = catalog();

        let free = DiscoveryFilter {
            free_only: true,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(ids(&free.apply(&catalog)), vec!["x/free-a", "y/free-b"]);

        let capped = DiscoveryFilter {
            max_prompt: Some(0.000001),
            limit: 20,
            ..Default::default()
        };
        assert_eq!(
            ids(&capped.apply(&catalog)),
            vec!["x/free-a", "y/free-b", "x/cheap"]
        );
    }

    #[test]
    fn test_vision_only() {
        let catalog = catalog();
        let filter = DiscoveryFilter {
            vision_only: true,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&catalog)), vec!["y/free-b"]);
    }

    #[test]
    fn test_search_and_limit() {
        let catalog = catalog();
        let filter = DiscoveryFilter {
            search: Some("  Y/ ".to_string()),
            limit: 20,
            ..Default::default()
        };
        assert_eq!(ids(&filter.apply(&catalog)), vec!["y/free-b"]);

        let zero_limit = DiscoveryFilter {
            limit: 0,
            ..Default::default()
        };
        assert_eq!(zero_limit.apply(&catalog).len(), 1, "limit clamps up to 1");
        assert_eq!(clamp_limit(1000), MAX_LIMIT);
    }

    #[test]
    fn test_format_summary() {
        let catalog = catalog();
        let filter = DiscoveryFilter {
            free_only: true,
            limit: 20,
            ..Default::default()
        };
        let summary = format_summary(&filter.apply(&catalog), &filter);

        assert!(summary.starts_with("[OpenRouter Model Hunter]\n\nFree models (prompt price = 0):"));
        assert!(summary.contains("1. x/free-a (context: 8192, prompt: 0)"));
        assert!(summary.contains("2. y/free-b (context: N/A, prompt: 0)"));
        assert!(summary.ends_with("Total listed: 2 (free: 2)"));
    }
}
