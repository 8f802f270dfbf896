//! OpenAI adapter for the `/v1/chat/completions` API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{ProxyRequest, Role};

use super::base::{compute_cost, execute_with_retry, RetryPolicy};
use super::{AdapterError, Capability, HttpTransport, ProviderAdapter, Transport};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// USD per million tokens (input, output) for a model identifier.
fn model_rates(model: &str) -> (f64, f64) {
    if model.contains("mini") {
        (0.15, 0.6)
    } else {
        (2.5, 10.0)
    }
}

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Chat completions request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages, system first.
    pub messages: Vec<OpenAiMessage>,
    /// Tool definitions.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    /// Maximum completion tokens.
    pub max_tokens: u32,
}

/// A message in chat format.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAiMessage {
    /// Role (`system`, `user`, `assistant`, `tool`).
    pub role: String,
    /// Plain text content.
    pub content: String,
}

/// Chat completions response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiResponse {
    /// Response choices.
    pub choices: Vec<OpenAiChoice>,
    /// Model that served the response.
    pub model: Option<String>,
    /// Token usage.
    pub usage: Option<OpenAiUsage>,
}

/// A response choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiChoice {
    /// Assistant message for this choice.
    pub message: OpenAiResponseMessage,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
}

/// Assistant message in a response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiResponseMessage {
    /// Optional text content.
    pub content: Option<String>,
    /// Optional tool calls.
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

/// A tool call in wire format.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiToolCall {
    /// Call identifier.
    pub id: Option<String>,
    /// Function payload.
    pub function: OpenAiFunctionCall,
}

/// Function payload of a tool call.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiFunctionCall {
    /// Function name.
    pub name: String,
    /// Arguments, already a JSON-encoded string on this wire.
    pub arguments: String,
}

/// Usage statistics.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    /// Prompt token count.
    pub prompt_tokens: Option<u32>,
    /// Completion token count.
    pub completion_tokens: Option<u32>,
}

// ---------------------------------------------------------------------------
// Builders (pub for integration testing)
// ---------------------------------------------------------------------------

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Build a chat completions request from a canonical request.
#[doc(hidden)]
pub fn build_request(model: &str, request: &ProxyRequest) -> OpenAiRequest {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(OpenAiMessage {
            role: "system".to_owned(),
            content: system.clone(),
        });
    }
    for message in &request.messages {
        messages.push(OpenAiMessage {
            role: wire_role(message.role).to_owned(),
            content: message.content.flat_text(),
        });
    }

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

    OpenAiRequest {
        model: model.to_owned(),
        messages,
        tools,
        max_tokens: request.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    }
}

/// Map a parsed chat completions reply into the canonical response shape.
///
/// # Errors
///
/// Returns [`AdapterError::Parse`] when the reply has no choices.
#[doc(hidden)]
pub fn map_response(
    response: OpenAiResponse,
    request_id: &str,
    fallback_model: &str,
) -> Result<Value, AdapterError> {
    let model = response
        .model
        .unwrap_or_else(|| fallback_model.to_owned());
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Parse("missing choices[0]".to_owned()))?;

    let tool_calls: Vec<Value> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            json!({
                "id": call.id.unwrap_or_default(),
                "function_name": call.function.name,
                "arguments": call.function.arguments,
            })
        })
        .collect();

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") | None => "stop",
        Some("tool_calls") => "tool_use",
        Some("length") => "length",
        // content_filter passes through; every other state collapses to it.
        _ => "content_filter",
    };

    let input_tokens = response
        .usage
        .as_ref()
        .and_then(|u| u.prompt_tokens)
        .unwrap_or(0);
    let output_tokens = response
        .usage
        .as_ref()
        .and_then(|u| u.completion_tokens)
        .unwrap_or(0);
    let (input_rate, output_rate) = model_rates(&model);
    let cost = compute_cost(input_tokens, output_tokens, input_rate, output_rate);

    let content = match choice.message.content {
        Some(text) if !text.is_empty() => Value::String(text),
        _ => Value::Null,
    };

    Ok(json!({
        "schema_version": 1,
        "id": request_id,
        "model_used": model,
        "content": content,
        "tool_calls": tool_calls,
        "finish_reason": finish_reason,
        "usage": {
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
            "cost_usd": cost,
        },
    }))
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Adapter for the OpenAI chat completions API.
pub struct OpenAiAdapter {
    model: String,
    api_key: String,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl OpenAiAdapter {
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

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn transform_request(&self, request: &ProxyRequest) -> Result<Value, AdapterError> {
        if !request.tools.is_empty() && !self.validate_capabilities(Capability::ToolUse) {
            return Err(AdapterError::UnsupportedCapability {
                model: self.model.clone(),
                capability: Capability::ToolUse,
            });
        }
        serde_json::to_value(build_request(&self.model, request))
            .map_err(|e| AdapterError::Parse(e.to_string()))
    }

    async fn execute(&self, payload: Value) -> Result<Value, AdapterError> {
        let headers = [("authorization", format!("Bearer {}", self.api_key))];
        let body = execute_with_retry(&self.retry, || {
            self.transport.post_json(API_URL, &headers, &payload)
        })
        .await?;
        serde_json::from_str(&body).map_err(|e| AdapterError::Parse(e.to_string()))
    }

    fn transform_response(&self, raw: Value, request_id: &str) -> Result<Value, AdapterError> {
        let response: OpenAiResponse =
            serde_json::from_value(raw).map_err(|e| AdapterError::Parse(e.to_string()))?;
        map_response(response, request_id, &self.model)
    }

    fn validate_capabilities(&self, capability: Capability) -> bool {
        match capability {
            Capability::ToolUse | Capability::SystemPrompt => true,
            Capability::Streaming => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, MessageContent, ProviderKind, ToolDefinition};

    fn request(text: &str) -> ProxyRequest {
        ProxyRequest {
            id: "openai-test".to_owned(),
            provider: ProviderKind::OpenAi,
            model: "gpt-4o".to_owned(),
            system: Some("be brief".to_owned()),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Text(text.to_owned()),
            }],
            tools: vec![],
            max_output_tokens: None,
            session_id: None,
        }
    }

    #[test]
    fn system_prompt_leads_the_messages() {
        let wire = build_request("gpt-4o", &request("hi"));
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[0].content, "be brief");
        assert_eq!(wire.messages[1].role, "user");
        assert_eq!(wire.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn tools_serialize_as_functions() {
        let mut req = request("hi");
        req.tools = vec![ToolDefinition {
            name: "get_weather".to_owned(),
            description: "weather".to_owned(),
            input_schema: json!({"type": "object"}),
        }];
        let wire = build_request("gpt-4o", &req);
        assert_eq!(wire.tools[0]["type"], "function");
        assert_eq!(wire.tools[0]["function"]["name"], "get_weather");
    }

    #[test]
    fn maps_text_reply() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "model": "gpt-4o",
            "choices": [{
                "message": { "content": "Hello there" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
        }))
        .expect("wire parse");
        let canonical = map_response(response, "openai-test", "gpt-4o").expect("map");
        assert_eq!(canonical["content"], "Hello there");
        assert_eq!(canonical["finish_reason"], "stop");
        assert_eq!(canonical["usage"]["input_tokens"], 12);
    }

    #[test]
    fn maps_tool_call_reply() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"paris\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": { "prompt_tokens": 30, "completion_tokens": 10 }
        }))
        .expect("wire parse");
        let canonical = map_response(response, "r", "gpt-4o").expect("map");
        assert_eq!(canonical["finish_reason"], "tool_use");
        assert_eq!(canonical["content"], Value::Null);
        assert_eq!(canonical["tool_calls"][0]["arguments"], "{\"city\":\"paris\"}");
    }

    #[test]
    fn missing_choices_is_a_parse_error() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "model": "gpt-4o",
            "choices": []
        }))
        .expect("wire parse");
        let error = map_response(response, "r", "gpt-4o").expect_err("no choices");
        assert!(matches!(error, AdapterError::Parse(_)));
    }

    #[test]
    fn unknown_finish_state_collapses() {
        let response: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": { "content": "partial" },
                "finish_reason": "flagged_by_upstream"
            }]
        }))
        .expect("wire parse");
        let canonical = map_response(response, "r", "gpt-4o").expect("map");
        assert_eq!(canonical["finish_reason"], "content_filter");
    }

    #[test]
    fn mini_models_price_lower() {
        assert_eq!(model_rates("gpt-4o-mini"), (0.15, 0.6));
        assert_eq!(model_rates("gpt-4o"), (2.5, 10.0));
    }
}
