//! Model metadata as fetched from the provider catalog
//!
//! [`RawModel`] mirrors the loosely-typed provider record; [`ModelDescriptor`]
//! is the normalized, immutable form the router works with.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Provider record from `GET /models`
///
/// Every field is optional so one odd record cannot poison the whole list.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub pricing: Option<RawPricing>,
    #[serde(default)]
    pub architecture: Option<RawArchitecture>,
}

/// Pricing block; OpenRouter sends prices as decimal strings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPricing {
    #[serde(default)]
    pub prompt: Option<serde_json::Value>,
}

/// Architecture block describing accepted modalities
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawArchitecture {
    #[serde(default)]
    pub input_modalities: Vec<String>,
    /// Legacy summary such as `"text+image->text"`
    #[serde(default)]
    pub modality: Option<String>,
}

impl RawModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_prompt_price(mut self, price: impl Into<String>) -> Self {
        self.pricing = Some(RawPricing {
            prompt: Some(serde_json::Value::String(price.into())),
        });
        self
    }

    pub fn with_input_modalities(mut self, modalities: &[&str]) -> Self {
        self.architecture = Some(RawArchitecture {
            input_modalities: modalities.iter().map(|m| m.to_string()).collect(),
            modality: None,
        });
        self
    }

    pub fn with_context_length(mut self, context_length: u64) -> Self {
        self.context_length = Some(context_length);
        self
    }
}

/// Normalized model metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub supports_vision: bool,
    pub is_free: bool,
    /// Prompt price per token; `None` when missing, unparseable or dynamic
    pub prompt_price: Option<f64>,
    pub context_length: Option<u64>,
}

impl ModelDescriptor {
    /// Normalize a provider record
    ///
    /// Returns `None` for records without an identifier.
    pub fn from_raw(raw: RawModel) -> Option<Self> {
        let id = raw.id.trim().to_string();
        if id.is_empty() {
            return None;
        }

        let prompt_price = raw
            .pricing
            .as_ref()
            .and_then(|p| p.prompt.as_ref())
            .and_then(parse_price);
        let supports_vision = raw
            .architecture
            .as_ref()
            .is_some_and(accepts_image_input);

        Some(Self {
            name: raw.name.unwrap_or_else(|| id.clone()),
            id,
            supports_vision,
            is_free: prompt_price == Some(0.0),
            prompt_price,
            context_length: raw.context_length,
        })
    }
}

/// Parse a price that may arrive as a string or a number
///
/// Negative values (OpenRouter uses `-1` for dynamically priced routers) and
/// non-finite values are treated as unknown.
pub fn parse_price(value: &serde_json::Value) -> Option<f64> {
    let price = match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (price.is_finite() && price >= 0.0).then_some(price)
}

fn accepts_image_input(architecture: &RawArchitecture) -> bool {
    if architecture
        .input_modalities
        .iter()
        .any(|m| m.eq_ignore_ascii_case("image"))
    {
        return true;
    }

    architecture.modality.as_deref().is_some_and(|modality| {
        let inputs = modality.split("->").next().unwrap_or_default();
        inputs
            .split('+')
            .any(|m| m.trim().eq_ignore_ascii_case("image"))
    })
}

/// Snapshot of the provider catalog
///
/// Built in one piece from a complete fetch and never mutated afterwards; a
/// refresh produces a new `ModelCatalog`.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
    by_id: HashMap<String, usize>,
    fetched_at: Instant,
}

impl ModelCatalog {
    /// Build a catalog, keeping the first occurrence of duplicated ids
    pub fn new(descriptors: Vec<ModelDescriptor>, fetched_at: Instant) -> Self {
        let mut models = Vec::with_capacity(descriptors.len());
        let mut by_id = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if by_id.contains_key(&descriptor.id) {
                tracing::debug!(model = %descriptor.id, "Skipping duplicate catalog record");
                continue;
            }
            by_id.insert(descriptor.id.clone(), models.len());
            models.push(descriptor);
        }
        Self {
            models,
            by_id,
            fetched_at,
        }
    }

    /// Normalize provider records, dropping records without an id
    pub fn from_records(records: Vec<RawModel>, fetched_at: Instant) -> Self {
        let descriptors = records
            .into_iter()
            .filter_map(ModelDescriptor::from_raw)
            .collect();
        Self::new(descriptors, fetched_at)
    }

    /// Models in provider order
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.by_id.get(id).map(|&index| &self.models[index])
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Age relative to `now`; zero if `now` precedes the fetch
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_free_is_derived_from_zero_prompt_price() {
        let free = ModelDescriptor::from_raw(RawModel::new("meta-llama/llama-3-8b:free").with_prompt_price("0"))
            .unwrap();
        assert!(free.is_free);
        assert_eq!(free.prompt_price, Some(0.0));

        let paid = ModelDescriptor::from_raw(RawModel::new("openai/gpt-4o").with_prompt_price("0.0000025"))
            .unwrap();
        assert!(!paid.is_free);
    }

    #[test]
    fn test_missing_or_garbage_price_is_unknown_and_not_free() {
        let missing = ModelDescriptor::from_raw(RawModel::new("a/b")).unwrap();
        assert_eq!(missing.prompt_price, None);
        assert!(!missing.is_free);

        assert_eq!(parse_price(&json!("abc")), None);
        assert_eq!(parse_price(&json!("-1")), None);
        assert_eq!(parse_price(&json!(null)), None);
        assert_eq!(parse_price(&json!(0)), Some(0.0));
        assert_eq!(parse_price(&json!("0.5")), Some(0.5));
    }

    #[test]
    fn test_vision_from_input_modalities() {
        let vision = ModelDescriptor::from_raw(
            RawModel::new("google/gemini-2.0-flash-exp:free").with_input_modalities(&["text", "image"]),
        )
        .unwrap();
        assert!(vision.supports_vision);

        let text = ModelDescriptor::from_raw(RawModel::new("a/b").with_input_modalities(&["text"]))
            .unwrap();
        assert!(!text.supports_vision);
    }

    #[test]
    fn test_vision_from_legacy_modality_string() {
        let raw: RawModel = serde_json::from_value(json!({
            "id": "x/vision",
            "architecture": {"modality": "text+image->text"}
        }))
        .unwrap();
        assert!(ModelDescriptor::from_raw(raw).unwrap().supports_vision);

        // image on the output side only is not image input
        let raw: RawModel = serde_json::from_value(json!({
            "id": "x/painter",
            "architecture": {"modality": "text->image"}
        }))
        .unwrap();
        assert!(!ModelDescriptor::from_raw(raw).unwrap().supports_vision);
    }

    #[test]
    fn test_record_without_id_is_dropped() {
        assert!(ModelDescriptor::from_raw(RawModel::new("  ")).is_none());
    }

    #[test]
    fn test_catalog_keeps_order_and_drops_duplicates() {
        let catalog = ModelCatalog::from_records(
            vec![
                RawModel::new("b/two"),
                RawModel::new("a/one"),
                RawModel::new("b/two").with_prompt_price("0"),
                RawModel::new(""),
            ],
            Instant::now(),
        );
        let ids: Vec<&str> = catalog.models().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b/two", "a/one"]);
        assert!(!catalog.get("b/two").unwrap().is_free);
        assert_eq!(catalog.get("a/one").unwrap().id, "a/one");
        assert!(catalog.get("c/three").is_none());
    }

    #[test]
    fn test_catalog_staleness() {
        let fetched_at = Instant::now();
        let catalog = ModelCatalog::new(Vec::new(), fetched_at);
        let ttl = Duration::from_secs(300);

        assert!(!catalog.is_stale(fetched_at + Duration::from_secs(300), ttl));
        assert!(catalog.is_stale(fetched_at + Duration::from_secs(301), ttl));
        assert_eq!(catalog.age(fetched_at), Duration::ZERO);
    }
}
