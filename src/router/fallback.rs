//! Auto-routing fallback engine
//!
//! Walks a [`CandidateList`] in order until one candidate answers. Rate
//! limits, missing models, modality mismatches and fatal errors advance to
//! the next candidate; a transient error earns the same candidate exactly one
//! retry after the configured backoff.

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::RequestId;
use crate::router::{
    AttemptFailure, AttemptOutcome, CandidateList, FailureClass, FailureLog, RoutingRequest,
};
use crate::shared::query::{CompletionExecutor, RetryPolicy};
use std::sync::Arc;

/// Completion served by one candidate
#[derive(Debug, Clone)]
pub struct ServedCompletion {
    pub content: String,
    pub model: String,
    /// Failed attempts before `model` answered
    pub failures: FailureLog,
}

pub struct FallbackEngine {
    executor: CompletionExecutor,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl FallbackEngine {
    pub fn new(executor: CompletionExecutor, policy: RetryPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            executor,
            policy,
            metrics,
        }
    }

    /// Try candidates in order until one succeeds
    ///
    /// # Errors
    /// Returns `AppError::AllCandidatesFailed` with every failed attempt once
    /// the list is exhausted, or `AppError::NoCandidatesAvailable` for an
    /// empty list.
    pub async fn run(
        &self,
        candidates: &CandidateList,
        request: &RoutingRequest,
        request_id: RequestId,
    ) -> AppResult<ServedCompletion> {
        if candidates.is_empty() {
            return Err(AppError::NoCandidatesAvailable {
                reason: "candidate list is empty".to_string(),
            });
        }

        let mut failures = FailureLog::new();
        let mut attempts = 0usize;

        for (position, candidate) in candidates.iter().enumerate() {
            let mut retried = false;

            loop {
                attempts += 1;
                let outcome = self.executor.execute(candidate, request).await;
                self.record_attempt(&outcome, request_id);

                let (class, detail) = match outcome {
                    AttemptOutcome::Success(content) => {
                        tracing::info!(
                            request_id = %request_id,
                            model = %candidate,
                            position = position + 1,
                            attempts,
                            failed_attempts = failures.len(),
                            response_length = content.len(),
                            "Completion served"
                        );
                        if let Err(e) = self.metrics.record_fallback_depth(attempts) {
                            self.metrics.metrics_recording_failure("record_fallback_depth");
                            tracing::error!(
                                request_id = %request_id,
                                error = %e,
                                "Metrics recording failed. Observability degraded but request continues."
                            );
                        }
                        return Ok(ServedCompletion {
                            content,
                            model: candidate.to_string(),
                            failures,
                        });
                    }
                    AttemptOutcome::RateLimited(detail) => (FailureClass::RateLimited, detail),
                    AttemptOutcome::NotFound(detail) => (FailureClass::NotFound, detail),
                    AttemptOutcome::ModalityMismatch(detail) => {
                        (FailureClass::ModalityMismatch, detail)
                    }
                    AttemptOutcome::TransientError(detail) => {
                        (FailureClass::TransientError, detail)
                    }
                    AttemptOutcome::FatalError(detail) => (FailureClass::FatalError, detail),
                };

                let will_retry = class == FailureClass::TransientError && !retried;
                tracing::warn!(
                    request_id = %request_id,
                    model = %candidate,
                    position = position + 1,
                    total_candidates = candidates.len(),
                    outcome = %class,
                    detail = %detail,
                    will_retry,
                    "Candidate attempt failed"
                );
                failures.record(AttemptFailure::new(candidate, class, detail));

                if !will_retry {
                    break;
                }
                retried = true;
                tokio::time::sleep(self.policy.transient_backoff()).await;
            }
        }

        tracing::error!(
            request_id = %request_id,
            total_candidates = candidates.len(),
            attempts,
            failures = %failures,
            "All candidates exhausted"
        );

        Err(AppError::AllCandidatesFailed { failures })
    }

    fn record_attempt(&self, outcome: &AttemptOutcome, request_id: RequestId) {
        if let Err(e) = self.metrics.record_attempt(outcome) {
            self.metrics.metrics_recording_failure("record_attempt");
            tracing::error!(
                request_id = %request_id,
                error = %e,
                outcome = outcome.label(),
                "Metrics recording failed. Observability degraded but request continues."
            );
        }
    }
}
