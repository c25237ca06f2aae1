//! Routing logic for modelrelay
//!
//! Turns a [`RoutingRequest`] into an ordered [`CandidateList`] and walks it
//! until one candidate model answers.

pub mod candidates;
pub mod fallback;
pub mod service;

pub use candidates::CandidateSelector;
pub use fallback::FallbackEngine;
pub use service::CompletionRouter;

use crate::error::AppResult;
use crate::guard;
use serde::Serialize;
use std::fmt;
use url::Url;

/// A validated completion request
///
/// Fields are private: the prompt and image URL are checked by the guard at
/// construction, so an invalid request cannot reach the executor.
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    prompt: String,
    model: Option<String>,
    image_url: Option<Url>,
    system_prompt: Option<String>,
}

impl RoutingRequest {
    /// Create a request from a prompt
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the prompt is empty, whitespace-only or too long.
    pub fn new(prompt: impl Into<String>) -> AppResult<Self> {
        let prompt = prompt.into();
        guard::validate_prompt(&prompt)?;
        Ok(Self {
            prompt,
            model: None,
            image_url: None,
            system_prompt: None,
        })
    }

    /// Set an explicit model reference (alias or canonical id)
    ///
    /// Blank references are ignored and leave the request in auto mode.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = if model.trim().is_empty() {
            None
        } else {
            Some(model.trim().to_string())
        };
        self
    }

    /// Attach an image by URL
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the URL is malformed or points at an
    /// internal address.
    pub fn with_image_url(mut self, url: &str) -> AppResult<Self> {
        self.image_url = Some(guard::validate_image_url(url)?);
        Ok(self)
    }

    /// Set system instructions; blank values are ignored
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        let system_prompt = system_prompt.into();
        self.system_prompt = if system_prompt.trim().is_empty() {
            None
        } else {
            Some(system_prompt)
        };
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_ref().map(Url::as_str)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Whether candidate selection must restrict to vision-capable models
    pub fn has_image(&self) -> bool {
        self.image_url.is_some()
    }
}

/// Ordered, duplicate-free list of canonical model identifiers to try
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateList(Vec<String>);

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate unless it is already present
    ///
    /// Returns true if the candidate was added.
    pub fn push(&mut self, model_id: impl Into<String>) -> bool {
        let model_id = model_id.into();
        if self.contains(&model_id) {
            return false;
        }
        self.0.push(model_id);
        true
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.0.iter().any(|c| c == model_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// Failure class of a single attempt, used for fallback decisions and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    RateLimited,
    NotFound,
    ModalityMismatch,
    TransientError,
    FatalError,
}

impl FailureClass {
    /// Label used in logs, metrics and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::ModalityMismatch => "modality_mismatch",
            Self::TransientError => "transient_error",
            Self::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one completion attempt against one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success(String),
    RateLimited(String),
    NotFound(String),
    ModalityMismatch(String),
    TransientError(String),
    FatalError(String),
}

impl AttemptOutcome {
    /// Failure class and detail, or `None` for `Success`
    pub fn failure(&self) -> Option<(FailureClass, &str)> {
        match self {
            Self::Success(_) => None,
            Self::RateLimited(detail) => Some((FailureClass::RateLimited, detail)),
            Self::NotFound(detail) => Some((FailureClass::NotFound, detail)),
            Self::ModalityMismatch(detail) => Some((FailureClass::ModalityMismatch, detail)),
            Self::TransientError(detail) => Some((FailureClass::TransientError, detail)),
            Self::FatalError(detail) => Some((FailureClass::FatalError, detail)),
        }
    }

    /// Label used in attempt metrics
    pub fn label(&self) -> &'static str {
        match self.failure() {
            None => "success",
            Some((class, _)) => class.as_str(),
        }
    }
}

/// One failed attempt recorded by the fallback engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptFailure {
    pub model: String,
    pub class: FailureClass,
    pub detail: String,
}

impl AttemptFailure {
    pub fn new(model: impl Into<String>, class: FailureClass, detail: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            class,
            detail: detail.into(),
        }
    }
}

/// Ordered log of failed attempts for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FailureLog(Vec<AttemptFailure>);

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, failure: AttemptFailure) {
        self.0.push(failure);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttemptFailure> {
        self.0.iter()
    }

    /// True if every recorded failure has the given class
    pub fn all(&self, class: FailureClass) -> bool {
        self.0.iter().all(|f| f.class == class)
    }

    pub fn as_slice(&self) -> &[AttemptFailure] {
        &self.0
    }
}

impl From<Vec<AttemptFailure>> for FailureLog {
    fn from(failures: Vec<AttemptFailure>) -> Self {
        Self(failures)
    }
}

impl fmt::Display for FailureLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {} ({})", failure.model, failure.class, failure.detail)?;
        }
        Ok(())
    }
}

/// Successful routed completion
#[derive(Debug, Clone, Serialize)]
pub struct RoutedCompletion {
    /// Reassembled response text
    pub content: String,
    /// Canonical id of the candidate that served the response
    pub model: String,
    /// True when the caller did not pin a usable model
    pub auto_selected: bool,
    /// Attempts that failed before the serving candidate answered
    pub failures: FailureLog,
    /// Non-fatal degradations (unknown model reference, dropped explicit model)
    pub warnings: Vec<String>,
}
