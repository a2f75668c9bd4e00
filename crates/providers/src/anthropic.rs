//! Anthropic Messages API transport.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - Streaming via SSE, split into lines on a background task
//! - Non-streaming mode returning the raw response document
//! - HTTP status mapped onto [`ProviderError`]

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use johnathan_config::AppConfig;
use johnathan_core::error::ProviderError;
use johnathan_core::provider::{LineStream, Request, Transport, TransportReply};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Anthropic native Messages API transport.
pub struct AnthropicTransport {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicTransport {
    /// Create a new transport with the given request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from application config. Fails if no API key is configured.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            ProviderError::AuthenticationFailed("No API key configured".into())
        })?;
        Ok(Self::new(api_key, Duration::from_secs(config.request_timeout_secs))?
            .with_base_url(&config.base_url))
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Map a non-success status onto a provider error.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid Anthropic API key".into(),
            ));
        }
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

fn map_body_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::StreamInterrupted(e.to_string())
    }
}

#[async_trait]
impl Transport for AnthropicTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, request: &Request) -> Result<TransportReply, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);

        debug!(
            provider = "anthropic",
            model = %request.model,
            stream = request.stream,
            messages = request.messages.len(),
            "Sending request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request);
        if request.stream {
            builder = builder.header("accept", "text/event-stream");
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let response = Self::check_status(response).await?;

        if request.stream {
            return Ok(TransportReply::Lines(line_stream(response)));
        }

        let document: serde_json::Value =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse Anthropic response: {e}"),
            })?;
        Ok(TransportReply::Document(document))
    }
}

/// Split the response body into lines on a background task.
///
/// The task stops as soon as the receiving side is dropped, which closes
/// the connection.
fn line_stream(response: reqwest::Response) -> LineStream {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut byte_stream = response.bytes_stream();
        let mut buffer = LineBuffer::default();

        while let Some(chunk_result) = byte_stream.next().await {
            let bytes = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    let _ = tx.send(Err(map_body_error(e))).await;
                    return;
                }
            };

            for line in buffer.push(&bytes) {
                if tx.send(Ok(line)).await.is_err() {
                    return;
                }
            }
        }

        if let Some(line) = buffer.finish() {
            let _ = tx.send(Ok(line)).await;
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Accumulates raw bytes and yields complete lines.
///
/// Works on bytes so a multi-byte character split across chunks survives.
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(Self::to_line(&line[..pos]));
        }
        lines
    }

    /// Flush a trailing line with no newline.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(Self::to_line(&rest))
    }

    fn to_line(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).trim_end_matches('\r').to_string()
    }
}
