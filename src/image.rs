//! Image generation pass-through
//!
//! No model call is involved: the image provider renders on demand from a
//! URL, so generating an image means building that URL and wrapping it in
//! markdown the agent can show.

use crate::config::ImagesConfig;
use crate::error::{AppError, AppResult};
use crate::guard;
use serde::Serialize;

/// Longest accepted image prompt in characters
pub const MAX_IMAGE_PROMPT_LENGTH: usize = 2_000;

/// A generated image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub url: String,
    pub markdown: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ImageGenerator {
    base_url: String,
    default_width: u32,
    default_height: u32,
}

impl ImageGenerator {
    pub fn new(config: &ImagesConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_width: config.default_width,
            default_height: config.default_height,
        }
    }

    /// Build the image URL and markdown for `prompt`
    ///
    /// Missing dimensions fall back to the configured defaults; all
    /// dimensions are clamped. The prompt is percent-encoded in the URL and
    /// markdown-escaped in the caption.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for an empty or oversized prompt.
    pub fn generate(
        &self,
        prompt: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> AppResult<GeneratedImage> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::Validation(
                "image prompt cannot be empty".to_string(),
            ));
        }
        let char_count = prompt.chars().count();
        if char_count > MAX_IMAGE_PROMPT_LENGTH {
            return Err(AppError::Validation(format!(
                "image prompt exceeds maximum length of {} characters (got {})",
                MAX_IMAGE_PROMPT_LENGTH, char_count
            )));
        }

        let (width, height) = guard::clamp_dimensions(
            width.unwrap_or(self.default_width),
            height.unwrap_or(self.default_height),
        );

        let url = format!(
            "{}/prompt/{}?width={}&height={}&nologo=true",
            self.base_url,
            urlencoding::encode(prompt),
            width,
            height
        );

        let markdown = format!(
            "![Generated Image]({url})\n\nPrompt: {caption}\n\n({width}x{height})",
            url = url,
            caption = guard::escape_markdown(prompt),
            width = width,
            height = height
        );

        tracing::info!(
            prompt_length = char_count,
            width,
            height,
            "Generated image URL"
        );

        Ok(GeneratedImage {
            url,
            markdown,
            width,
            height,
        })
    }
}
