//! Provider adapter boundary.
//!
//! Defines the four-method [`ProviderAdapter`] contract every back-end
//! translator implements, the [`Transport`] seam the concrete adapters post
//! through, and [`AdapterError`] -- the one failure type the pipeline ever
//! sees from this layer. No provider-native concept escapes past
//! `transform_response`.
//!
//! Three adapters are implemented:
//! - [`anthropic::AnthropicAdapter`] -- Anthropic `/v1/messages` API
//! - [`openai::OpenAiAdapter`] -- OpenAI `/v1/chat/completions` API
//! - [`ollama::OllamaAdapter`] -- Ollama `/api/chat` API

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::types::ProxyRequest;

pub mod anthropic;
pub mod base;
pub mod ollama;
pub mod openai;
pub mod registry;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Feature a caller may require from a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Native tool/function calling.
    ToolUse,
    /// A dedicated system-prompt channel.
    SystemPrompt,
    /// Incremental streaming responses. Unsupported by this proxy.
    Streaming,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolUse => f.write_str("tool use"),
            Self::SystemPrompt => f.write_str("system prompt"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures inside an adapter. The pipeline wraps every variant into a
/// single `ADAPTER_ERROR` violation; callers never see these raw.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// HTTP transport failure before a status was received.
    #[error("transport request failed: {0}")]
    Transport(String),
    /// Upstream responded with a non-success status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized, truncated response body.
        body: String,
    },
    /// An attempt exceeded the per-attempt timeout.
    #[error("request timed out after {0} ms")]
    Timeout(u64),
    /// All retry attempts were consumed.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The final attempt's error.
        last_error: String,
    },
    /// Provider payload did not match its own wire schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// The request asks for a feature the model does not have.
    #[error("model '{model}' does not support {capability}")]
    UnsupportedCapability {
        /// Model identifier.
        model: String,
        /// The missing feature.
        capability: Capability,
    },
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Status and body of one upstream reply.
#[derive(Debug, Clone)]
pub struct TransportReply {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl TransportReply {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The fetch primitive adapters post through. Production uses
/// [`HttpTransport`]; adapter tests substitute canned replies.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body and return the reply, whatever its status.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<TransportReply, AdapterError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh connection pool.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<TransportReply, AdapterError> {
        let mut request = self.client.post(url).header("content-type", "application/json");
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| AdapterError::Transport(sanitize_error_body(&e.to_string())))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::Transport(sanitize_error_body(&e.to_string())))?;
        Ok(TransportReply { status, body })
    }
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// A provider-specific translator. Exactly four operations; the pipeline
/// never sees anything else from an adapter.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Translate the canonical request into the provider's wire shape.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::UnsupportedCapability`] when the request
    /// needs a feature the model lacks.
    fn transform_request(&self, request: &ProxyRequest) -> Result<Value, AdapterError>;

    /// Perform the transport call. The only suspension point in the
    /// pipeline; retry and timeout live below this method.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] on exhausted retries, timeouts, and
    /// non-success transport status.
    async fn execute(&self, payload: Value) -> Result<Value, AdapterError>;

    /// Translate the provider's reply into the canonical response shape,
    /// echoing `request_id`. Every provider finish state maps into the four
    /// canonical values; unknown states collapse to `content_filter`.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Parse`] when the reply does not match the
    /// provider's own wire schema.
    fn transform_response(&self, raw: Value, request_id: &str) -> Result<Value, AdapterError>;

    /// Read-only self-report from the adapter's model->features matrix.
    fn validate_capabilities(&self, capability: Capability) -> bool;
}

// ---------------------------------------------------------------------------
// Error-body hygiene
// ---------------------------------------------------------------------------

const MAX_ERROR_BODY_CHARS: usize = 256;

/// Scrub token-like secrets from an upstream error body and bound its size
/// before it can reach a violation payload or a log line.
pub fn sanitize_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"sk-ant-[A-Za-z0-9_\-]{10,}",
        r"sk-[A-Za-z0-9]{32,}",
        r"Bearer\s+[A-Za-z0-9._\-]{16,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}
