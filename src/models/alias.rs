//! Friendly model names
//!
//! Maps short, case-insensitive names such as `gemini` to canonical provider
//! identifiers (`vendor/model[:variant]`). The table is built once at startup
//! from the `[aliases]` config section and the `OPENROUTER_MODEL_ALIASES`
//! environment variable; malformed entries are dropped with a warning rather
//! than failing startup.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static CANONICAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*/[A-Za-z0-9][A-Za-z0-9._-]*(:[A-Za-z0-9._-]+)?$")
        .expect("canonical model id pattern is valid")
});

/// True if `id` has the `vendor/model[:variant]` shape
pub fn is_canonical_id(id: &str) -> bool {
    CANONICAL_ID.is_match(id)
}

/// Alias name to canonical id, keys lowercased
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, value)` pairs, keeping only entries whose
    /// value is a canonical id string
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a serde_json::Value)>,
    {
        let mut table = Self::new();
        for (name, value) in entries {
            let key = name.trim().to_lowercase();
            if key.is_empty() {
                tracing::warn!("Ignoring model alias with empty name");
                continue;
            }

            let Some(target) = value.as_str().map(str::trim) else {
                tracing::warn!(alias = %key, value = %value, "Ignoring model alias: value is not a string");
                continue;
            };
            if !is_canonical_id(target) {
                tracing::warn!(
                    alias = %key,
                    target = %target,
                    "Ignoring model alias: target is not a vendor/model identifier"
                );
                continue;
            }

            table.entries.insert(key, target.to_string());
        }
        table
    }

    /// Parse a JSON object of aliases
    ///
    /// Invalid JSON or a non-object value yields an empty table and a warning.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => Self::from_entries(map.iter()),
            Ok(other) => {
                tracing::warn!(
                    kind = json_kind(&other),
                    "Ignoring model aliases: expected a JSON object"
                );
                Self::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring model aliases: invalid JSON");
                Self::new()
            }
        }
    }

    /// Merge `overrides` into this table; entries in `overrides` win
    pub fn merge(mut self, overrides: AliasTable) -> Self {
        self.entries.extend(overrides.entries);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Alias names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Where a resolved identifier came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Looked up in the alias table
    Alias,
    /// Caller passed a canonical id
    Direct,
}

/// A model reference resolved to a canonical identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub id: String,
    pub source: ResolutionSource,
}

/// Resolves caller-supplied model references
///
/// Aliases take precedence over direct ids, so a configured alias can shadow
/// a name that also happens to look canonical.
#[derive(Debug, Clone, Default)]
pub struct AliasResolver {
    table: AliasTable,
}

impl AliasResolver {
    pub fn new(table: AliasTable) -> Self {
        Self { table }
    }

    /// Resolve a reference; `None` for blank input or an unknown name that
    /// is not a canonical id
    pub fn resolve(&self, name: &str) -> Option<ResolvedModel> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        if let Some(target) = self.table.get(name) {
            return Some(ResolvedModel {
                id: target.to_string(),
                source: ResolutionSource::Alias,
            });
        }

        is_canonical_id(name).then(|| ResolvedModel {
            id: name.to_string(),
            source: ResolutionSource::Direct,
        })
    }

    /// Resolve to a bare identifier
    pub fn resolve_id(&self, name: &str) -> Option<String> {
        self.resolve(name).map(|resolved| resolved.id)
    }

    pub fn table(&self) -> &AliasTable {
        &self.table
    }
}
