//! Configuration management for modelrelay
//!
//! Parses an optional TOML file, applies environment overrides and validates
//! the result. Every section has defaults, so an empty (or missing) file is a
//! valid configuration apart from the API key.

use crate::error::{AppError, AppResult};
use crate::models::alias::{AliasTable, is_canonical_id};
use crate::shared::query::{DEFAULT_TRANSIENT_BACKOFF_MS, MAX_TRANSIENT_BACKOFF_MS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for `server.request_timeout_seconds`
pub const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 300;

/// Upper bound for `routing.max_candidates`
pub const MAX_CANDIDATES_LIMIT: usize = 20;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Alias name to canonical model id; malformed entries are dropped later
    #[serde(default)]
    pub aliases: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub images: ImagesConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    /// Raw `OPENROUTER_MODEL_ALIASES` JSON, merged over `aliases`
    #[serde(skip)]
    alias_overrides: Option<String>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bounds each upstream attempt, stream included
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    120
}

/// Upstream provider configuration
///
/// Fields are private; the API key in particular never appears in `Debug`
/// output.
#[derive(Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    base_url: String,
    #[serde(default, skip_serializing)]
    api_key: Option<String>,
    #[serde(default)]
    referer: Option<String>,
    #[serde(default = "default_title")]
    title: String,
}

impl UpstreamConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// API key, if configured and non-blank
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Sent as `HTTP-Referer` for OpenRouter app attribution
    pub fn referer(&self) -> Option<&str> {
        self.referer.as_deref()
    }

    /// Sent as `X-Title`
    pub fn title(&self) -> &str {
        &self.title
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            referer: None,
            title: default_title(),
        }
    }
}

impl std::fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("referer", &self.referer)
            .field("title", &self.title)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_title() -> String {
    "modelrelay".to_string()
}

/// Routing configuration
///
/// `max_candidates` and `transient_backoff_ms` are range-checked while
/// parsing, so an out-of-range `RoutingConfig` cannot be constructed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(try_from = "RawRoutingConfig")]
pub struct RoutingConfig {
    default_model: Option<String>,
    priority: Vec<String>,
    max_candidates: usize,
    transient_backoff_ms: u64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRoutingConfig {
    #[serde(default = "default_default_model")]
    default_model: Option<String>,
    #[serde(default)]
    priority: Vec<String>,
    #[serde(default = "default_max_candidates")]
    max_candidates: usize,
    #[serde(default = "default_transient_backoff_ms")]
    transient_backoff_ms: u64,
}

impl TryFrom<RawRoutingConfig> for RoutingConfig {
    type Error = String;

    fn try_from(raw: RawRoutingConfig) -> Result<Self, Self::Error> {
        if raw.max_candidates == 0 || raw.max_candidates > MAX_CANDIDATES_LIMIT {
            return Err(format!(
                "routing.max_candidates must be between 1 and {}, got {}",
                MAX_CANDIDATES_LIMIT, raw.max_candidates
            ));
        }
        if raw.transient_backoff_ms > MAX_TRANSIENT_BACKOFF_MS {
            return Err(format!(
                "routing.transient_backoff_ms cannot exceed {}, got {}",
                MAX_TRANSIENT_BACKOFF_MS, raw.transient_backoff_ms
            ));
        }

        Ok(Self {
            default_model: raw
                .default_model
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty()),
            priority: raw.priority,
            max_candidates: raw.max_candidates,
            transient_backoff_ms: raw.transient_backoff_ms,
        })
    }
}

impl RoutingConfig {
    /// Model appended after the free candidates; `None` disables it
    pub fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    /// Preferred free models (aliases or canonical ids), tried before catalog order
    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    pub fn transient_backoff_ms(&self) -> u64 {
        self.transient_backoff_ms
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_model: default_default_model(),
            priority: Vec::new(),
            max_candidates: default_max_candidates(),
            transient_backoff_ms: default_transient_backoff_ms(),
        }
    }
}

fn default_default_model() -> Option<String> {
    Some("google/gemini-2.0-flash-lite-001".to_string())
}

fn default_max_candidates() -> usize {
    crate::router::candidates::DEFAULT_MAX_CANDIDATES
}

fn default_transient_backoff_ms() -> u64 {
    DEFAULT_TRANSIENT_BACKOFF_MS
}

/// Image generation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImagesConfig {
    #[serde(default = "default_images_base_url")]
    pub base_url: String,
    #[serde(default = "default_image_side")]
    pub default_width: u32,
    #[serde(default = "default_image_side")]
    pub default_height: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            base_url: default_images_base_url(),
            default_width: default_image_side(),
            default_height: default_image_side(),
        }
    }
}

fn default_images_base_url() -> String {
    "https://image.pollinations.ai".to_string()
}

fn default_image_side() -> u32 {
    1024
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Load the file if it exists (defaults otherwise), then apply process
    /// environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_file(path.as_ref())?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, then re-validate
    ///
    /// Recognized keys: `OPENROUTER_API_KEY`, `OPENROUTER_DEFAULT_MODEL`,
    /// `OPENROUTER_MODEL_ALIASES`, `OPENROUTER_BASE_URL`, `REQUEST_TIMEOUT`.
    /// Blank values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(model) = get("OPENROUTER_DEFAULT_MODEL") {
            self.routing.default_model = Some(model.trim().to_string());
        }
        if let Some(aliases) = get("OPENROUTER_MODEL_ALIASES") {
            self.alias_overrides = Some(aliases);
        }
        if let Some(base_url) = get("OPENROUTER_BASE_URL") {
            self.upstream.base_url = base_url.trim().to_string();
        }
        if let Some(timeout) = get("REQUEST_TIMEOUT") {
            // Seconds, fractional values round up
            match timeout.trim().parse::<f64>() {
                Ok(seconds) if seconds.is_finite() && seconds > 0.0 => {
                    self.server.request_timeout_seconds = seconds.ceil() as u64;
                }
                _ => {
                    return Err(AppError::Config(format!(
                        "REQUEST_TIMEOUT must be a positive number of seconds, got '{}'",
                        timeout
                    )));
                }
            }
        }

        self.validate()
    }

    /// Alias table from `[aliases]` merged with `OPENROUTER_MODEL_ALIASES`
    pub fn alias_table(&self) -> AliasTable {
        let base = AliasTable::from_entries(self.aliases.iter());
        match &self.alias_overrides {
            Some(json) => base.merge(AliasTable::from_json(json)),
            None => base,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        if self.server.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "server.request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.server.request_timeout_seconds > MAX_REQUEST_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "server.request_timeout_seconds cannot exceed {} seconds, got {}",
                MAX_REQUEST_TIMEOUT_SECONDS, self.server.request_timeout_seconds
            )));
        }

        for (field, url) in [
            ("upstream.base_url", self.upstream.base_url.as_str()),
            ("images.base_url", self.images.base_url.as_str()),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "{} must start with 'http://' or 'https://', got '{}'",
                    field, url
                )));
            }
        }

        if let Some(model) = self.routing.default_model()
            && !is_canonical_id(model)
        {
            return Err(AppError::Config(format!(
                "routing.default_model must be a vendor/model identifier, got '{}'",
                model
            )));
        }

        if !LOG_LEVELS.contains(&self.observability.log_level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level must be one of {:?}, got '{}'",
                LOG_LEVELS, self.observability.log_level
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(toml_str).map_err(|source| {
            AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            }
        })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 8080
request_timeout_seconds = 60

[upstream]
api_key = "sk-or-test"
referer = "https://example.com/agent"
title = "test-agent"

[routing]
default_model = "openai/gpt-4o-mini"
priority = ["gemini", "meta-llama/llama-3.3-70b-instruct:free"]
max_candidates = 3
transient_backoff_ms = 100

[aliases]
gemini = "google/gemini-2.0-flash-exp:free"
broken = 7

[images]
base_url = "https://images.example.com"

[observability]
log_level = "debug"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.upstream.api_key(), Some("sk-or-test"));
        assert_eq!(config.upstream.referer(), Some("https://example.com/agent"));
        assert_eq!(config.routing.default_model(), Some("openai/gpt-4o-mini"));
        assert_eq!(config.routing.priority().len(), 2);
        assert_eq!(config.routing.max_candidates(), 3);
        assert_eq!(config.routing.transient_backoff_ms(), 100);
        assert_eq!(config.images.base_url, "https://images.example.com");
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").expect("empty config should be valid");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.request_timeout_seconds, 120);
        assert_eq!(config.upstream.base_url(), "https://openrouter.ai/api/v1");
        assert_eq!(config.upstream.api_key(), None);
        assert_eq!(
            config.routing.default_model(),
            Some("google/gemini-2.0-flash-lite-001")
        );
        assert_eq!(config.routing.max_candidates(), 5);
        assert_eq!(config.routing.transient_backoff_ms(), 250);
        assert_eq!(config.images.base_url, "https://image.pollinations.ai");
    }

    #[test]
    fn test_alias_table_drops_malformed_entries() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        let table = config.alias_table();
        assert_eq!(table.get("GEMINI"), Some("google/gemini-2.0-flash-exp:free"));
        assert_eq!(table.get("broken"), None);
    }

    #[test]
    fn test_env_overrides_take_precedence() {
        let mut config = Config::from_str(TEST_CONFIG).expect("should parse config");
        config
            .apply_env_overrides(env(&[
                ("OPENROUTER_API_KEY", "sk-or-env"),
                ("OPENROUTER_DEFAULT_MODEL", "anthropic/claude-3-haiku"),
                ("OPENROUTER_MODEL_ALIASES", r#"{"gemini": "google/gemini-pro-1.5"}"#),
                ("OPENROUTER_BASE_URL", "http://127.0.0.1:9999/api/v1"),
                ("REQUEST_TIMEOUT", "45.5"),
            ]))
            .expect("overrides should be valid");

        assert_eq!(config.upstream.api_key(), Some("sk-or-env"));
        assert_eq!(config.routing.default_model(), Some("anthropic/claude-3-haiku"));
        assert_eq!(config.alias_table().get("gemini"), Some("google/gemini-pro-1.5"));
        assert_eq!(config.upstream.base_url(), "http://127.0.0.1:9999/api/v1");
        assert_eq!(config.server.request_timeout_seconds, 46);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::from_str(TEST_CONFIG).expect("should parse config");
        config
            .apply_env_overrides(env(&[("OPENROUTER_API_KEY", "  ")]))
            .expect("blank overrides are ignored");
        assert_eq!(config.upstream.api_key(), Some("sk-or-test"));
    }

    #[test]
    fn test_invalid_request_timeout_env_is_rejected() {
        let mut config = Config::default();
        for bad in ["abc", "0", "-5", "301"] {
            let result = config.apply_env_overrides(env(&[("REQUEST_TIMEOUT", bad)]));
            assert!(result.is_err(), "REQUEST_TIMEOUT={} should be rejected", bad);
            config = Config::default();
        }
    }

    #[test]
    fn test_routing_ranges_checked_at_parse_time() {
        for bad in [
            "[routing]\nmax_candidates = 0",
            "[routing]\nmax_candidates = 21",
            "[routing]\ntransient_backoff_ms = 10001",
        ] {
            let err = Config::from_str(bad).unwrap_err();
            assert!(
                matches!(err, AppError::ConfigParseFailed { .. }),
                "{:?} should fail while parsing",
                bad
            );
        }
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        for bad in [
            "[server]\nrequest_timeout_seconds = 0",
            "[server]\nrequest_timeout_seconds = 301",
            "[upstream]\nbase_url = \"ftp://example.com\"",
            "[routing]\ndefault_model = \"not-canonical\"",
            "[observability]\nlog_level = \"loud\"",
        ] {
            assert!(Config::from_str(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_empty_default_model_disables_default() {
        let config = Config::from_str("[routing]\ndefault_model = \"\"").expect("should parse");
        assert_eq!(config.routing.default_model(), None);
    }

    #[test]
    fn test_api_key_is_redacted_in_debug() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-or-test"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_from_file_missing_file_reports_path() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, AppError::ConfigFileRead { .. }));
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
