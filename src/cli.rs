//! Command-line interface for modelrelay
//!
//! Provides argument parsing and subcommand handling for the modelrelay binary.

use clap::{Parser, Subcommand};

/// Free-first model router for OpenRouter-backed agents
#[derive(Parser)]
#[command(name = "modelrelay")]
#[command(version)]
#[command(about = "Free-first model router for OpenRouter-backed agents")]
#[command(
    long_about = "modelrelay picks a backend model for each agent request, preferring free \
    models, and falls back to alternates when a model is rate-limited, missing, or cannot \
    handle the request's modality."
)]
pub struct Cli {
    /// Path to configuration file (optional; defaults apply if it does not exist)
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP tool server (default)
    Serve,

    /// List free and low-cost models from the catalog
    Models {
        /// Show only free models (prompt price = 0)
        #[arg(long)]
        free_only: bool,

        /// Maximum prompt price to include (e.g. 0.0000005)
        #[arg(long)]
        max_prompt: Option<f64>,

        /// Show only models that accept image input
        #[arg(long)]
        vision: bool,

        /// Case-insensitive substring matched against model id and name
        #[arg(long)]
        search: Option<String>,

        /// Maximum number of models to display (clamped to 1..=100)
        #[arg(long, default_value_t = crate::models::discovery::DEFAULT_CLI_LIMIT)]
        limit: usize,
    },

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# modelrelay Configuration
# ========================
#
# Every setting has a default; this file is optional. Environment variables
# (also read from .env) override the file:
#
#   OPENROUTER_API_KEY        upstream API key (required for serve/models)
#   OPENROUTER_DEFAULT_MODEL  routing.default_model
#   OPENROUTER_MODEL_ALIASES  JSON object merged over [aliases]
#   OPENROUTER_BASE_URL       upstream.base_url
#   REQUEST_TIMEOUT           server.request_timeout_seconds

# ─────────────────────────────────────────────────────────────────────────────
# SERVER CONFIGURATION
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (127.0.0.1 keeps the tool surface local)
host = "127.0.0.1"

# Port to listen on
port = 3000

# Upper bound for one upstream attempt in seconds, stream included (1-300)
request_timeout_seconds = 120

# ─────────────────────────────────────────────────────────────────────────────
# UPSTREAM PROVIDER
# ─────────────────────────────────────────────────────────────────────────────

[upstream]
base_url = "https://openrouter.ai/api/v1"

# Prefer OPENROUTER_API_KEY in the environment over storing the key here
# api_key = "sk-or-..."

# Attribution headers (HTTP-Referer / X-Title)
# referer = "https://github.com/your-org/your-agent"
title = "modelrelay"

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────
#
# Candidates for a request are, in order:
#   1. the explicitly requested model (if it exists and fits the request)
#   2. free models, vision-capable only when an image is attached:
#      `priority` entries first, then catalog order, up to `max_candidates`
#   3. `default_model`

[routing]
default_model = "google/gemini-2.0-flash-lite-001"

# Aliases or vendor/model ids
priority = []

# Cap on explicit + free candidates (1-20); the default model is extra
max_candidates = 5

# Pause before the single retry after a timeout or dropped connection (0-10000)
transient_backoff_ms = 250

# ─────────────────────────────────────────────────────────────────────────────
# MODEL ALIASES
# ─────────────────────────────────────────────────────────────────────────────
#
# Short, case-insensitive names for vendor/model[:variant] ids.
# Entries that are not vendor/model ids are ignored with a warning.

[aliases]
# gemini = "google/gemini-2.0-flash-exp:free"
# llama = "meta-llama/llama-3.3-70b-instruct:free"

# ─────────────────────────────────────────────────────────────────────────────
# IMAGE GENERATION
# ─────────────────────────────────────────────────────────────────────────────

[images]
base_url = "https://image.pollinations.ai"
# Used when a request omits width/height; always clamped to 64-2048
default_width = 1024
default_height = 1024

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
