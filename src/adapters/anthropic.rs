//! Anthropic adapter for the `/v1/messages` API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::types::{ProxyRequest, Role};

use super::base::{compute_cost, execute_with_retry, RetryPolicy};
use super::{AdapterError, Capability, HttpTransport, ProviderAdapter, Transport};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// USD per million tokens (input, output) for a model identifier.
fn model_rates(model: &str) -> (f64, f64) {
    if model.contains("haiku") {
        (0.8, 4.0)
    } else if model.contains("opus") {
        (15.0, 75.0)
    } else {
        // Sonnet-class default.
        (3.0, 15.0)
    }
}

/// Adapter for the Anthropic messages API.
pub struct AnthropicAdapter {
    model: String,
    api_key: String,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl AnthropicAdapter {
    /// Create an adapter with the default HTTP transport and retry policy.
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_transport(model, api_key, Arc::new(HttpTransport::new()))
    }

    /// Create an adapter posting through the given transport.
    pub fn with_transport(
        model: impl Into<String>,
        api_key: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            transport,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    }
}

/// Build the `/v1/messages` body for a canonical request.
#[doc(hidden)]
pub fn build_request(model: &str, request: &ProxyRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            let text = message.content.flat_text();
            json!({
                "role": wire_role(message.role),
                "content": text,
            })
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
    }

    body
}

/// Map an Anthropic reply into the canonical response shape.
#[doc(hidden)]
pub fn map_response(raw: &Value, request_id: &str, fallback_model: &str) -> Value {
    let mut text = String::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    if let Some(items) = raw.get("content").and_then(Value::as_array) {
        for item in items {
            match item.get("type").and_then(Value::as_str).unwrap_or_default() {
                "text" => {
                    if let Some(part) = item.get("text").and_then(Value::as_str) {
                        text.push_str(part);
                    }
                }
                "tool_use" => {
                    let arguments = item
                        .get("input")
                        .map(|input| serde_json::to_string(input).unwrap_or_else(|_| "{}".to_owned()))
                        .unwrap_or_else(|| "{}".to_owned());
                    tool_calls.push(json!({
                        "id": item.get("id").and_then(Value::as_str).unwrap_or_default(),
                        "function_name": item.get("name").and_then(Value::as_str).unwrap_or_default(),
                        "arguments": arguments,
                    }));
                }
                _ => {}
            }
        }
    }

    let finish_reason = match raw.get("stop_reason").and_then(Value::as_str) {
        Some("end_turn" | "stop_sequence") => "stop",
        Some("tool_use") => "tool_use",
        Some("max_tokens") => "length",
        // Refusals and any future stop state collapse to the filtered value.
        _ => "content_filter",
    };

    let input_tokens = raw
        .pointer("/usage/input_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output_tokens = raw
        .pointer("/usage/output_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let model = raw
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(fallback_model);
    let (input_rate, output_rate) = model_rates(model);
    let cost = compute_cost(
        u32::try_from(input_tokens).unwrap_or(u32::MAX),
        u32::try_from(output_tokens).unwrap_or(u32::MAX),
        input_rate,
        output_rate,
    );

    json!({
        "schema_version": 1,
        "id": request_id,
        "model_used": model,
        "content": if text.is_empty() { Value::Null } else { Value::String(text) },
        "tool_calls": tool_calls,
        "finish_reason": finish_reason,
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
            "cost_usd": cost,
        },
    })
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn transform_request(&self, request: &ProxyRequest) -> Result<Value, AdapterError> {
        if !request.tools.is_empty() && !self.validate_capabilities(Capability::ToolUse) {
            return Err(AdapterError::UnsupportedCapability {
                model: self.model.clone(),
                capability: Capability::ToolUse,
            });
        }
        Ok(build_request(&self.model, request))
    }

    async fn execute(&self, payload: Value) -> Result<Value, AdapterError> {
        let headers = [
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", API_VERSION.to_owned()),
        ];
        let body = execute_with_retry(&self.retry, || {
            self.transport.post_json(API_URL, &headers, &payload)
        })
        .await?;
        serde_json::from_str(&body).map_err(|e| AdapterError::Parse(e.to_string()))
    }

    fn transform_response(&self, raw: Value, request_id: &str) -> Result<Value, AdapterError> {
        if !raw.is_object() {
            return Err(AdapterError::Parse("reply is not a JSON object".to_owned()));
        }
        Ok(map_response(&raw, request_id, &self.model))
    }

    fn validate_capabilities(&self, capability: Capability) -> bool {
        match capability {
            Capability::ToolUse | Capability::SystemPrompt => true,
            Capability::Streaming => false,
        }
    }
}
