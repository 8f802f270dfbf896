//! Canonical data model shared across the pipeline.
//!
//! Defines the single request/response shape exchanged with provider
//! adapters, the closed enumerations (provider tag, security tier, finish
//! reason, violation code, interceptor name), and the [`Violation`] record
//! every guard stage emits instead of an error.

use serde::{Deserialize, Serialize};

/// The canonical response schema version this crate produces and accepts.
pub const SCHEMA_VERSION: u8 = 1;

/// `model_used` value stamped on responses synthesized for blocked calls.
pub const GUARDRAIL_MODEL: &str = "guardrail";

// ---------------------------------------------------------------------------
// Closed enumerations
// ---------------------------------------------------------------------------

/// Supported LLM back-end families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Anthropic messages API.
    #[serde(rename = "anthropic")]
    Anthropic,
    /// OpenAI chat completions API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Locally hosted Ollama instance.
    #[serde(rename = "local-ollama")]
    LocalOllama,
}

impl ProviderKind {
    /// Canonical wire tag for this provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::LocalOllama => "local-ollama",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "local-ollama" => Ok(Self::LocalOllama),
            other => Err(anyhow::anyhow!("unknown provider tag: {other}")),
        }
    }
}

/// Coarse policy dial selecting how aggressive the injection scan is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityTier {
    /// All pattern categories, including roleplay and hypothetical framing.
    Strict,
    /// The base pattern categories only.
    Moderate,
    /// Same pattern coverage as moderate; reserved for future relaxation.
    Permissive,
}

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Human or orchestrator message.
    User,
    /// Assistant (LLM) message.
    Assistant,
    /// Tool result fed back after a tool call.
    Tool,
}

/// Why a completion stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Normal end of turn.
    Stop,
    /// The model wants to call a tool.
    ToolUse,
    /// Max token limit reached.
    Length,
    /// Content was filtered -- by the provider or by this proxy.
    ContentFilter,
}

impl FinishReason {
    /// Canonical wire string for this reason.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::ToolUse => "tool_use",
            Self::Length => "length",
            Self::ContentFilter => "content_filter",
        }
    }

    /// Parse a canonical wire string; unknown strings are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stop" => Some(Self::Stop),
            "tool_use" => Some(Self::ToolUse),
            "length" => Some(Self::Length),
            "content_filter" => Some(Self::ContentFilter),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A message in the canonical conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,
    /// Message content -- plain text or structured blocks.
    pub content: MessageContent,
}

/// The content of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Structured content blocks.
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Flatten the content into one newline-joined text body, descending
    /// into nested block payloads. Used by adapters whose wire format wants
    /// plain strings.
    pub fn flat_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => {
                let mut fragments: Vec<&str> = Vec::new();
                collect_blocks(blocks, &mut fragments);
                fragments.join("\n")
            }
        }
    }
}

/// A single structured content block.
///
/// The `content` field carries nested payloads (tool results wrapping
/// further blocks); guards traverse it recursively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Plain text carried by this block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Nested payload, text or further blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<BlockContent>,
}

/// Nested block payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockContent {
    /// Plain text payload.
    Text(String),
    /// Further nested blocks.
    Blocks(Vec<ContentBlock>),
}

/// A tool the orchestrator offers to the model for this call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name; must be registered in the skill registry to pass grounding.
    pub name: String,
    /// Description shown to the model.
    pub description: String,
    /// JSON Schema for the tool's parameters. Opaque to the pipeline.
    pub input_schema: serde_json::Value,
}

/// The canonical request owned by the pipeline for the duration of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRequest {
    /// Caller-chosen request identifier, echoed on the response.
    pub id: String,
    /// Which back-end family should serve the call.
    pub provider: ProviderKind,
    /// Provider-specific model identifier.
    pub model: String,
    /// System prompt injected before the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Ordered conversation history.
    pub messages: Vec<Message>,
    /// Tools available for this call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Maximum output tokens hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Session identifier for cost aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ProxyRequest {
    /// All textual fragments of the request in traversal order: the system
    /// prompt, then each message's text (string-form or block-form,
    /// descending into nested block payloads).
    ///
    /// This is the surface the injection scanner matches against and the
    /// alignment checker sizes for the pre-flight estimate.
    pub fn textual_fragments(&self) -> Vec<&str> {
        let mut fragments = Vec::new();
        if let Some(system) = &self.system {
            fragments.push(system.as_str());
        }
        for message in &self.messages {
            collect_content(&message.content, &mut fragments);
        }
        fragments
    }
}

fn collect_content<'a>(content: &'a MessageContent, out: &mut Vec<&'a str>) {
    match content {
        MessageContent::Text(text) => out.push(text.as_str()),
        MessageContent::Blocks(blocks) => collect_blocks(blocks, out),
    }
}

fn collect_blocks<'a>(blocks: &'a [ContentBlock], out: &mut Vec<&'a str>) {
    for block in blocks {
        if let Some(text) = &block.text {
            out.push(text.as_str());
        }
        match &block.content {
            Some(BlockContent::Text(text)) => out.push(text.as_str()),
            Some(BlockContent::Blocks(nested)) => collect_blocks(nested, out),
            None => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier.
    #[serde(default)]
    pub id: String,
    /// Name of the function the model wants to invoke.
    pub function_name: String,
    /// JSON-encoded argument string, decoded only by the grounder.
    pub arguments: String,
}

/// Token and cost accounting for one call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    pub input_tokens: u32,
    /// Tokens generated in the response.
    pub output_tokens: u32,
    /// Computed cost in USD.
    pub cost_usd: f64,
}

impl Usage {
    /// The zero usage record stamped on synthesized blocked responses.
    pub const fn zero() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
        }
    }
}

/// The canonical response returned for every call, blocked or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyResponse {
    /// Always [`SCHEMA_VERSION`].
    pub schema_version: u8,
    /// Request identifier echoed by the adapter.
    pub id: String,
    /// The model that served the response, or [`GUARDRAIL_MODEL`] when blocked.
    pub model_used: String,
    /// Response text; absent when the model produced none or the call was blocked.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls requested by the model.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
    /// Token and cost accounting.
    pub usage: Usage,
}

impl ProxyResponse {
    /// The synthesized response returned when a guard stage blocks the call:
    /// no content, no tool calls, `content_filter` finish, zero usage.
    pub fn filtered(request_id: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            id: request_id.to_owned(),
            model_used: GUARDRAIL_MODEL.to_owned(),
            content: None,
            tool_calls: Vec::new(),
            finish_reason: FinishReason::ContentFilter,
            usage: Usage::zero(),
        }
    }
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// Closed set of violation codes surfaced to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    /// A prompt-injection pattern matched a textual request field.
    InjectionDetected,
    /// Reserved: the default policy redacts PII instead of blocking.
    PiiDetected,
    /// The pre-flight cost estimate exceeded the per-call ceiling.
    BudgetExceeded,
    /// The requested provider is not in the allow-list.
    ProviderNotAllowed,
    /// The adapter's response failed canonical-shape validation.
    SchemaMismatch,
    /// A tool reference could not be grounded in the skill registry.
    ToolNotGrounded,
    /// Model output referenced a package outside the dependency whitelist.
    HallucinationDetected,
    /// Transport, timeout, or capability failure inside an adapter.
    AdapterError,
    /// The policy configuration failed to load or validate.
    ConfigError,
}

impl ViolationCode {
    /// Canonical wire string for this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InjectionDetected => "INJECTION_DETECTED",
            Self::PiiDetected => "PII_DETECTED",
            Self::BudgetExceeded => "BUDGET_EXCEEDED",
            Self::ProviderNotAllowed => "PROVIDER_NOT_ALLOWED",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::ToolNotGrounded => "TOOL_NOT_GROUNDED",
            Self::HallucinationDetected => "HALLUCINATION_DETECTED",
            Self::AdapterError => "ADAPTER_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }
}

/// Which pipeline stage produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterceptorKind {
    /// Inbound structural-intent pattern scan.
    InjectionScanner,
    /// Inbound PII redaction (transforms, never blocks).
    PiiMasker,
    /// Inbound policy alignment (provider, budget, tool scope).
    AlignmentChecker,
    /// Outbound canonical-shape validation.
    SchemaEnforcer,
    /// Outbound tool-call grounding.
    ToolGrounder,
    /// Outbound hallucinated-import scrape.
    HallucinationScraper,
    /// The pipeline itself (adapter and resolution failures).
    Orchestrator,
}

impl InterceptorKind {
    /// Canonical wire string for this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InjectionScanner => "injection_scanner",
            Self::PiiMasker => "pii_masker",
            Self::AlignmentChecker => "alignment_checker",
            Self::SchemaEnforcer => "schema_enforcer",
            Self::ToolGrounder => "tool_grounder",
            Self::HallucinationScraper => "hallucination_scraper",
            Self::Orchestrator => "orchestrator",
        }
    }
}

/// A structured policy violation. Violations are data: guard stages return
/// them instead of raising, and the pipeline forwards them to the caller
/// alongside the canonical response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Machine-readable violation class.
    pub code: ViolationCode,
    /// Human-readable description.
    pub message: String,
    /// The stage that produced this violation.
    pub interceptor: InterceptorKind,
    /// Sanitized forensic context. Must never contain PII or secrets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Violation {
    /// Create a violation without forensic payload.
    pub fn new(
        code: ViolationCode,
        interceptor: InterceptorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            interceptor,
            payload: None,
        }
    }

    /// Attach a sanitized payload.
    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
