//! Chat endpoint handler
//!
//! Handles POST /chat: routes one prompt to the first candidate model that
//! answers.

use crate::error::AppError;
use crate::guard;
use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::router::{RoutedCompletion, RoutingRequest};
use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Deserializer, Serialize};

/// Chat request from the agent bridge
///
/// Prompt validation is enforced during deserialization. The image URL is
/// checked when the request is converted into a [`RoutingRequest`].
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    prompt: String,
    model: Option<String>,
    image_url: Option<String>,
    system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Build the routing request
    ///
    /// # Errors
    /// Returns `AppError::Validation` for a rejected image URL.
    pub fn into_routing_request(self) -> Result<RoutingRequest, AppError> {
        let mut request = RoutingRequest::new(self.prompt)?;
        if let Some(model) = self.model {
            request = request.with_model(model);
        }
        if let Some(image_url) = self.image_url.as_deref() {
            request = request.with_image_url(image_url)?;
        }
        if let Some(system_prompt) = self.system_prompt {
            request = request.with_system_prompt(system_prompt);
        }
        Ok(request)
    }
}

/// Treat blank optional strings as absent
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl<'de> Deserialize<'de> for ChatRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawChatRequest {
            prompt: String,
            #[serde(default)]
            model: Option<String>,
            #[serde(default)]
            image_url: Option<String>,
            #[serde(default)]
            system_prompt: Option<String>,
        }

        let raw = RawChatRequest::deserialize(deserializer)?;

        if let Err(e) = guard::validate_prompt(&raw.prompt) {
            return Err(serde::de::Error::custom(e));
        }

        Ok(ChatRequest {
            prompt: raw.prompt,
            model: non_blank(raw.model).map(|m| m.trim().to_string()),
            image_url: non_blank(raw.image_url),
            system_prompt: non_blank(raw.system_prompt),
        })
    }
}

/// POST /chat handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<RoutedCompletion>, AppError> {
    tracing::debug!(
        request_id = %request_id,
        prompt_length = request.prompt().chars().count(),
        model = ?request.model(),
        has_image = request.image_url().is_some(),
        "Received chat request"
    );

    let request = request.into_routing_request()?;

    let started = std::time::Instant::now();
    let completion = state.router().route(&request, request_id).await?;

    tracing::info!(
        request_id = %request_id,
        model = %completion.model,
        auto_selected = completion.auto_selected,
        failed_attempts = completion.failures.len(),
        warnings = completion.warnings.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    Ok(Json(completion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::create_test_state;

    #[test]
    fn test_chat_request_minimal() {
        let request: ChatRequest = serde_json::from_str(r#"{"prompt": "hello"}"#).unwrap();
        assert_eq!(request.prompt(), "hello");
        assert_eq!(request.model(), None);
        assert_eq!(request.image_url(), None);
    }

    #[test]
    fn test_chat_request_rejects_blank_prompt() {
        let result: Result<ChatRequest, _> = serde_json::from_str(r#"{"prompt": "  \n "}"#);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("empty"), "unexpected error: {}", err);
    }

    #[test]
    fn test_chat_request_blank_model_is_absent() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"prompt": "hi", "model": "  ", "image_url": ""}"#).unwrap();
        assert_eq!(request.model(), None);
        assert_eq!(request.image_url(), None);
    }

    #[test]
    fn test_into_routing_request_rejects_internal_image() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"prompt": "describe", "image_url": "http://127.0.0.1/x.png"}"#)
                .unwrap();
        assert!(matches!(
            request.into_routing_request(),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_handler_routes_to_free_model() {
        let state = create_test_state();
        let request: ChatRequest = serde_json::from_str(r#"{"prompt": "hello"}"#).unwrap();

        let Json(completion) = handler(State(state), Extension(RequestId::new()), Json(request))
            .await
            .expect("chat should succeed");

        assert_eq!(completion.model, "vendor/text:free");
        assert_eq!(completion.content, "answer from vendor/text:free");
        assert!(completion.auto_selected);
        assert!(completion.failures.is_empty());
    }

    #[tokio::test]
    async fn test_handler_image_request_uses_vision_model() {
        let state = create_test_state();
        let request: ChatRequest = serde_json::from_str(
            r#"{"prompt": "what is this?", "image_url": "https://example.com/cat.png"}"#,
        )
        .unwrap();

        let Json(completion) = handler(State(state), Extension(RequestId::new()), Json(request))
            .await
            .unwrap();

        assert_eq!(completion.model, "vendor/vision:free");
    }
}
