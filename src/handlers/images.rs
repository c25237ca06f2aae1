//! Image endpoint handler
//!
//! POST /images returns a provider URL and a markdown snippet for a prompt.

use crate::error::AppError;
use crate::handlers::AppState;
use crate::image::GeneratedImage;
use crate::middleware::RequestId;
use axum::{Extension, Json, extract::State};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

/// POST /images handler
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<ImageRequest>,
) -> Result<Json<GeneratedImage>, AppError> {
    tracing::debug!(
        request_id = %request_id,
        width = ?request.width,
        height = ?request.height,
        "Received image request"
    );

    let image = state
        .images()
        .generate(&request.prompt, request.width, request.height)?;
    Ok(Json(image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::create_test_state;

    #[tokio::test]
    async fn test_image_handler_clamps_dimensions() {
        let request = ImageRequest {
            prompt: "lighthouse at dusk".to_string(),
            width: Some(4096),
            height: None,
        };
        let Json(image) = handler(
            State(create_test_state()),
            Extension(RequestId::new()),
            Json(request),
        )
        .await
        .unwrap();

        assert_eq!(image.width, 2048);
        assert_eq!(image.height, 1024);
        assert!(image.url.contains("lighthouse%20at%20dusk"));
    }

    #[tokio::test]
    async fn test_image_handler_rejects_empty_prompt() {
        let request = ImageRequest {
            prompt: String::new(),
            width: None,
            height: None,
        };
        let result = handler(
            State(create_test_state()),
            Extension(RequestId::new()),
            Json(request),
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
