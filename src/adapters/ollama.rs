//! Ollama adapter for the local `/api/chat` API.
//!
//! Local inference is free: the cost calculator runs with zero rates so the
//! usage record is still well-formed.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::types::{ProxyRequest, Role};

use super::base::{execute_with_retry, RetryPolicy};
use super::{AdapterError, Capability, HttpTransport, ProviderAdapter, Transport};

/// Default base URL of a local Ollama daemon.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Adapter for a local Ollama instance.
pub struct OllamaAdapter {
    model: String,
    base_url: String,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl OllamaAdapter {
    /// Create an adapter against the given daemon base URL.
    pub fn new(model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_transport(model, base_url, Arc::new(HttpTransport::new()))
    }

    /// Create an adapter posting through the given transport.
    pub fn with_transport(
        model: impl Into<String>,
        base_url: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
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

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Build the `/api/chat` body for a canonical request.
#[doc(hidden)]
pub fn build_request(model: &str, request: &ProxyRequest) -> Value {
    let mut messages: Vec<Value> = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for message in &request.messages {
        messages.push(json!({
            "role": wire_role(message.role),
            "content": message.content.flat_text(),
        }));
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": false,
    });

    if let Some(max_tokens) = request.max_output_tokens {
        body["options"] = json!({ "num_predict": max_tokens });
    }

    if !request.tools.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
    }

    body
}

/// Map an Ollama reply into the canonical response shape.
#[doc(hidden)]
pub fn map_response(raw: &Value, request_id: &str, fallback_model: &str) -> Value {
    let message = raw.get("message").cloned().unwrap_or(Value::Null);
    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let mut tool_calls: Vec<Value> = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let arguments = function
                .get("arguments")
                .map(|a| serde_json::to_string(a).unwrap_or_else(|_| "{}".to_owned()))
                .unwrap_or_else(|| "{}".to_owned());
            tool_calls.push(json!({
                "id": call.get("id").and_then(Value::as_str).unwrap_or_default(),
                "function_name": function.get("name").and_then(Value::as_str).unwrap_or_default(),
                "arguments": arguments,
            }));
        }
    }

    let finish_reason = if !tool_calls.is_empty() {
        "tool_use"
    } else {
        match raw.get("done_reason").and_then(Value::as_str) {
            Some("stop") | None => "stop",
            Some("length") => "length",
            _ => "content_filter",
        }
    };

    let input_tokens = raw
        .get("prompt_eval_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output_tokens = raw.get("eval_count").and_then(Value::as_u64).unwrap_or(0);

    json!({
        "schema_version": 1,
        "id": request_id,
        "model_used": raw.get("model").and_then(Value::as_str).unwrap_or(fallback_model),
        "content": if text.is_empty() { Value::Null } else { Value::String(text) },
        "tool_calls": tool_calls,
        "finish_reason": finish_reason,
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
            // Local inference carries no marginal cost.
            "cost_usd": 0.0,
        },
    })
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
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
        let url = self.chat_url();
        let body = execute_with_retry(&self.retry, || {
            self.transport.post_json(&url, &[], &payload)
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
            Capability::SystemPrompt => true,
            // Tool calling needs a tools-capable local model; the common
            // llama3.x / qwen builds have it, older models do not.
            Capability::ToolUse => {
                let model = self.model.as_str();
                model.contains("llama3") || model.contains("qwen") || model.contains("mistral")
            }
            Capability::Streaming => false,
        }
    }
}
