//! Shared execution logic used by the router and handlers

pub mod query;

pub use query::{CompletionExecutor, RetryPolicy};
