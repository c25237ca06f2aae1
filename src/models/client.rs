//! Upstream provider client
//!
//! [`CompletionProvider`] and [`CatalogProvider`] are the seams between the
//! router and the network; [`OpenRouterClient`] implements both against the
//! OpenRouter HTTP API with one pooled `reqwest::Client`.

use crate::config::UpstreamConfig;
use crate::error::{AppError, AppResult};
use crate::models::descriptor::RawModel;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;

/// Longest upstream error body kept in an error detail
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Failure talking to the upstream provider
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// Non-success HTTP status, or an error object inside the stream
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: u64 },

    /// Connection refused, DNS failure, TLS error and similar
    #[error("transport error: {0}")]
    Transport(String),

    /// Stream broke after the response started
    #[error("stream interrupted after {bytes_received} bytes: {message}")]
    StreamInterrupted {
        bytes_received: usize,
        message: String,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// One completion call
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub system_prompt: Option<&'a str>,
    pub image_url: Option<&'a str>,
}

/// Issues one completion call against one model
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Return the full response text
    async fn complete(
        &self,
        model_id: &str,
        request: &CompletionRequest<'_>,
    ) -> Result<String, UpstreamError>;
}

/// Lists the models the provider currently serves
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_models(&self) -> Result<Vec<RawModel>, UpstreamError>;
}

/// OpenRouter HTTP client
#[derive(Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenRouterClient {
    /// Create a client from upstream configuration
    ///
    /// `timeout` bounds catalog fetches; completion calls are bounded by the
    /// executor.
    ///
    /// # Errors
    /// Returns `AppError::Config` if no API key is configured or a header
    /// value is not valid ASCII.
    pub fn new(config: &UpstreamConfig, timeout: Duration) -> AppResult<Self> {
        let api_key = config.api_key().ok_or_else(|| {
            AppError::Config(
                "OPENROUTER_API_KEY is not set (set it in the environment, .env, or [upstream].api_key)"
                    .to_string(),
            )
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
        if let Some(referer) = config.referer() {
            headers.insert("HTTP-Referer", header_value(referer)?);
        }
        headers.insert("X-Title", header_value(config.title())?);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(16)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_send_error(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout {
                timeout_seconds: self.timeout.as_secs(),
            }
        } else {
            UpstreamError::Transport(error.to_string())
        }
    }
}

fn header_value(value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| AppError::Config(format!("Invalid upstream header value: {}", e)))
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(
        &self,
        model_id: &str,
        request: &CompletionRequest<'_>,
    ) -> Result<String, UpstreamError> {
        let body = json!({
            "model": model_id,
            "messages": build_messages(request),
            "stream": true,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        // Some providers ignore `stream: true` and answer with one JSON body
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        if is_json {
            let body: Value = response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
            return parse_completion_body(&body);
        }

        collect_stream(response).await
    }
}

#[async_trait]
impl CatalogProvider for OpenRouterClient {
    async fn list_models(&self) -> Result<Vec<RawModel>, UpstreamError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;
        parse_models_body(body)
    }
}

/// Build the chat `messages` array
///
/// With an image the user message content becomes a multimodal array of a
/// text part and an `image_url` part.
pub fn build_messages(request: &CompletionRequest<'_>) -> Value {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }

    let content = match request.image_url {
        Some(url) => json!([
            {"type": "text", "text": request.prompt},
            {"type": "image_url", "image_url": {"url": url}},
        ]),
        None => Value::String(request.prompt.to_string()),
    };
    messages.push(json!({"role": "user", "content": content}));

    Value::Array(messages)
}

/// Parse a `GET /models` body (`{"data": [...]}`)
///
/// Records that fail to deserialize are skipped individually.
pub fn parse_models_body(body: Value) -> Result<Vec<RawModel>, UpstreamError> {
    let Some(Value::Array(records)) = body.get("data").cloned() else {
        return Err(UpstreamError::InvalidResponse(
            "expected a `data` array in /models response".to_string(),
        ));
    };

    let mut models = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<RawModel>(record) {
            Ok(model) => models.push(model),
            Err(e) => tracing::warn!(index, error = %e, "Skipping malformed model record"),
        }
    }
    Ok(models)
}

fn parse_completion_body(body: &Value) -> Result<String, UpstreamError> {
    if let Some(error) = body.get("error") {
        return Err(error_object_to_status(error));
    }
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            UpstreamError::InvalidResponse("completion body has no message content".to_string())
        })
}

/// One parsed SSE line
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    /// Text to append to the response
    Delta(String),
    /// `data: [DONE]`
    Done,
    /// Comment, keep-alive, non-data field, or chunk without text
    Skip,
}

/// Parse one line of an OpenRouter SSE stream
///
/// # Errors
/// Returns `UpstreamError::Status` when the chunk carries an `error` object;
/// its `code` becomes the status (502 when absent).
pub fn parse_sse_line(line: &str) -> Result<SseLine, UpstreamError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let Ok(chunk) = serde_json::from_str::<Value>(data) else {
        tracing::debug!(chunk = %truncate_chars(data, 120), "Skipping unparseable SSE chunk");
        return Ok(SseLine::Skip);
    };

    if let Some(error) = chunk.get("error") {
        return Err(error_object_to_status(error));
    }

    match chunk
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(text) if !text.is_empty() => Ok(SseLine::Delta(text.to_string())),
        _ => Ok(SseLine::Skip),
    }
}

fn error_object_to_status(error: &Value) -> UpstreamError {
    let status = match error.get("code") {
        Some(Value::Number(n)) => n.as_u64().and_then(|c| u16::try_from(c).ok()),
        Some(Value::String(s)) => s.parse::<u16>().ok(),
        _ => None,
    }
    .unwrap_or(502);

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string());

    UpstreamError::Status {
        status,
        body: truncate_chars(&message, MAX_ERROR_BODY_CHARS),
    }
}

/// Read an SSE response to completion and concatenate the deltas
async fn collect_stream(response: reqwest::Response) -> Result<String, UpstreamError> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut content = String::new();
    let mut bytes_received = 0usize;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpstreamError::StreamInterrupted {
            bytes_received,
            message: e.to_string(),
        })?;
        bytes_received += chunk.len();
        buffer.extend_from_slice(&chunk);

        while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            match parse_sse_line(&String::from_utf8_lossy(&line))? {
                SseLine::Delta(text) => content.push_str(&text),
                SseLine::Done => return Ok(content),
                SseLine::Skip => {}
            }
        }
    }

    // Final line without a trailing newline
    if !buffer.is_empty()
        && let SseLine::Delta(text) = parse_sse_line(&String::from_utf8_lossy(&buffer))?
    {
        content.push_str(&text);
    }

    Ok(content)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
