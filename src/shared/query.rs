//! Single-attempt completion execution and outcome classification
//!
//! The executor issues exactly one upstream call per `execute` and turns
//! whatever comes back into an [`AttemptOutcome`]; retry and fallback
//! decisions belong to the [`FallbackEngine`](crate::router::FallbackEngine).

use crate::models::client::{CompletionProvider, CompletionRequest, UpstreamError};
use crate::router::{AttemptOutcome, RoutingRequest};
use std::sync::Arc;
use std::time::Duration;

/// Default pause before retrying a candidate after a transient error
pub const DEFAULT_TRANSIENT_BACKOFF_MS: u64 = 250;

/// Largest accepted transient backoff (10 seconds)
pub const MAX_TRANSIENT_BACKOFF_MS: u64 = 10_000;

/// How transient failures are retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Pause before the single retry of a candidate that failed transiently
    transient_backoff_ms: u64,
}

impl RetryPolicy {
    /// Create a retry policy
    ///
    /// # Errors
    /// Returns an error if the backoff exceeds [`MAX_TRANSIENT_BACKOFF_MS`].
    pub fn new(transient_backoff_ms: u64) -> Result<Self, &'static str> {
        if transient_backoff_ms > MAX_TRANSIENT_BACKOFF_MS {
            return Err("transient_backoff_ms must be at most 10000");
        }
        Ok(Self {
            transient_backoff_ms,
        })
    }

    pub fn transient_backoff_ms(&self) -> u64 {
        self.transient_backoff_ms
    }

    pub fn transient_backoff(&self) -> Duration {
        Duration::from_millis(self.transient_backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient_backoff_ms: DEFAULT_TRANSIENT_BACKOFF_MS,
        }
    }
}

/// Issues one completion call against one candidate
#[derive(Clone)]
pub struct CompletionExecutor {
    provider: Arc<dyn CompletionProvider>,
    timeout: Duration,
}

impl CompletionExecutor {
    /// `timeout` bounds the whole attempt, stream included
    pub fn new(provider: Arc<dyn CompletionProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute one attempt and classify the result
    ///
    /// Never fails: every upstream problem maps to a failure variant of
    /// [`AttemptOutcome`]. A completion that is empty after trimming counts as
    /// `FatalError`.
    pub async fn execute(&self, candidate_id: &str, request: &RoutingRequest) -> AttemptOutcome {
        let upstream_request = CompletionRequest {
            prompt: request.prompt(),
            system_prompt: request.system_prompt(),
            image_url: request.image_url(),
        };

        tracing::debug!(
            model = %candidate_id,
            prompt_length = request.prompt().len(),
            has_image = request.has_image(),
            timeout_seconds = self.timeout.as_secs(),
            "Starting completion attempt"
        );

        let result = tokio::time::timeout(
            self.timeout,
            self.provider.complete(candidate_id, &upstream_request),
        )
        .await;

        match result {
            Err(_elapsed) => AttemptOutcome::TransientError(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            )),
            Ok(Ok(content)) if content.trim().is_empty() => {
                AttemptOutcome::FatalError("model returned an empty completion".to_string())
            }
            Ok(Ok(content)) => AttemptOutcome::Success(content),
            Ok(Err(e)) => classify(&e),
        }
    }
}

/// Map an upstream error to an attempt outcome
///
/// Checked in order: rate limiting, modality mismatch, missing model,
/// transient transport failure, then everything else as fatal.
pub fn classify(error: &UpstreamError) -> AttemptOutcome {
    let detail = error.to_string();
    match error {
        UpstreamError::Status { status, body } => {
            let text = body.to_lowercase();
            if *status == 429 {
                AttemptOutcome::RateLimited(detail)
            } else if mentions_modality(&text) {
                AttemptOutcome::ModalityMismatch(detail)
            } else if *status == 404 || *status == 410 || mentions_missing_model(&text) {
                AttemptOutcome::NotFound(detail)
            } else {
                AttemptOutcome::FatalError(detail)
            }
        }
        UpstreamError::Timeout { .. }
        | UpstreamError::Transport(_)
        | UpstreamError::StreamInterrupted { .. } => AttemptOutcome::TransientError(detail),
        UpstreamError::InvalidResponse(_) => AttemptOutcome::FatalError(detail),
    }
}

/// Phrases that only appear when the image part of the request was rejected.
/// Model ids often contain "vision", so bare keywords are not enough.
fn mentions_modality(text: &str) -> bool {
    [
        "support image input",
        "image input is not supported",
        "does not support image",
        "image inputs are not supported",
        "does not accept image",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}

fn mentions_missing_model(text: &str) -> bool {
    [
        "not a valid model",
        "not found",
        "does not exist",
        "deprecated",
        "no endpoints found",
    ]
    .iter()
    .any(|needle| text.contains(needle))
}
