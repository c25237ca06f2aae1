//! modelrelay - Free-first model router for OpenRouter-backed agents
//!
//! This library picks a backend model for each completion request, preferring
//! free models, and falls back to alternates when a model is rate-limited,
//! missing, or cannot handle the request's modality.

pub mod cli;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod image;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod router;
pub mod shared;
pub mod telemetry;
