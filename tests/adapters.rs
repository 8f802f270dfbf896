//! Adapter wire-shape and retry behavior against a canned transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use gatehouse::adapters::anthropic::AnthropicAdapter;
use gatehouse::adapters::base::RetryPolicy;
use gatehouse::adapters::ollama::OllamaAdapter;
use gatehouse::adapters::openai::OpenAiAdapter;
use gatehouse::adapters::{AdapterError, ProviderAdapter, Transport, TransportReply};
use gatehouse::types::{Message, MessageContent, ProviderKind, ProxyRequest, Role};

// ── Canned transport ──

struct CannedTransport {
    replies: Mutex<Vec<TransportReply>>,
    calls: AtomicUsize,
    seen_urls: Mutex<Vec<String>>,
}

impl CannedTransport {
    fn replying(replies: Vec<TransportReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
            seen_urls: Mutex::new(Vec::new()),
        })
    }

    fn ok(body: Value) -> Arc<Self> {
        Self::replying(vec![TransportReply {
            status: 200,
            body: body.to_string(),
        }])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CannedTransport {
    async fn post_json(
        &self,
        url: &str,
        _headers: &[(&str, String)],
        _body: &Value,
    ) -> Result<TransportReply, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_urls.lock().expect("test lock").push(url.to_owned());
        let mut replies = self.replies.lock().expect("test lock");
        if replies.is_empty() {
            return Err(AdapterError::Transport("no canned reply left".to_owned()));
        }
        Ok(replies.remove(0))
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        multiplier: 2.0,
        attempt_timeout: Duration::from_secs(5),
    }
}

fn request(provider: ProviderKind, model: &str) -> ProxyRequest {
    ProxyRequest {
        id: "wire-test".to_owned(),
        provider,
        model: model.to_owned(),
        system: Some("be terse".to_owned()),
        messages: vec![Message {
            role: Role::User,
            content: MessageContent::Text("hello".to_owned()),
        }],
        tools: vec![],
        max_output_tokens: Some(64),
        session_id: None,
    }
}

// ── Anthropic ──

#[tokio::test]
async fn anthropic_round_trip() {
    let transport = CannedTransport::ok(json!({
        "model": "claude-sonnet-4",
        "content": [{ "type": "text", "text": "Hi!" }],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 10, "output_tokens": 8 }
    }));
    let adapter =
        AnthropicAdapter::with_transport("claude-sonnet-4", "key", Arc::clone(&transport) as Arc<dyn Transport>)
            .with_retry(fast_retry());

    let req = request(ProviderKind::Anthropic, "claude-sonnet-4");
    let payload = adapter.transform_request(&req).expect("transform");
    assert_eq!(payload["system"], "be terse");
    assert_eq!(payload["max_tokens"], 64);

    let raw = adapter.execute(payload).await.expect("execute");
    let canonical = adapter
        .transform_response(raw, &req.id)
        .expect("canonical map");
    assert_eq!(canonical["id"], "wire-test");
    assert_eq!(canonical["content"], "Hi!");
    assert_eq!(canonical["finish_reason"], "stop");
    let cost = canonical["usage"]["cost_usd"].as_f64().expect("cost");
    assert!((cost - 0.00015).abs() < 1e-12, "got {cost}");
}

// ── OpenAI ──

#[tokio::test]
async fn openai_round_trip() {
    let transport = CannedTransport::ok(json!({
        "model": "gpt-4o",
        "choices": [{
            "message": { "content": "Hello there" },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 4 }
    }));
    let adapter = OpenAiAdapter::with_transport("gpt-4o", "key", Arc::clone(&transport) as Arc<dyn Transport>)
        .with_retry(fast_retry());

    let req = request(ProviderKind::OpenAi, "gpt-4o");
    let payload = adapter.transform_request(&req).expect("transform");
    assert_eq!(payload["messages"][0]["role"], "system");

    let raw = adapter.execute(payload).await.expect("execute");
    let canonical = adapter
        .transform_response(raw, &req.id)
        .expect("canonical map");
    assert_eq!(canonical["model_used"], "gpt-4o");
    assert_eq!(canonical["content"], "Hello there");
    assert_eq!(canonical["usage"]["input_tokens"], 12);
}

// ── Ollama ──

#[tokio::test]
async fn ollama_round_trip_hits_chat_endpoint() {
    let transport = CannedTransport::ok(json!({
        "model": "llama3.1",
        "message": { "role": "assistant", "content": "local hello" },
        "done_reason": "stop",
        "prompt_eval_count": 7,
        "eval_count": 3
    }));
    let adapter = OllamaAdapter::with_transport(
        "llama3.1",
        "http://localhost:11434",
        Arc::clone(&transport) as Arc<dyn Transport>,
    )
    .with_retry(fast_retry());

    let req = request(ProviderKind::LocalOllama, "llama3.1");
    let payload = adapter.transform_request(&req).expect("transform");
    let raw = adapter.execute(payload).await.expect("execute");
    let canonical = adapter
        .transform_response(raw, &req.id)
        .expect("canonical map");

    assert_eq!(canonical["content"], "local hello");
    assert_eq!(canonical["usage"]["cost_usd"], 0.0);
    let urls = transport.seen_urls.lock().expect("test lock");
    assert_eq!(urls[0], "http://localhost:11434/api/chat");
}

// ── Retry behavior through a real adapter ──

#[tokio::test]
async fn adapter_retries_server_errors_then_succeeds() {
    let transport = CannedTransport::replying(vec![
        TransportReply {
            status: 503,
            body: "overloaded".to_owned(),
        },
        TransportReply {
            status: 200,
            body: json!({
                "model": "gpt-4o",
                "choices": [{ "message": { "content": "ok" }, "finish_reason": "stop" }]
            })
            .to_string(),
        },
    ]);
    let adapter = OpenAiAdapter::with_transport("gpt-4o", "key", Arc::clone(&transport) as Arc<dyn Transport>)
        .with_retry(fast_retry());

    let req = request(ProviderKind::OpenAi, "gpt-4o");
    let payload = adapter.transform_request(&req).expect("transform");
    let raw = adapter.execute(payload).await.expect("second attempt ok");
    assert_eq!(transport.calls(), 2);
    let canonical = adapter.transform_response(raw, &req.id).expect("map");
    assert_eq!(canonical["content"], "ok");
}

#[tokio::test]
async fn adapter_exhausts_retries_into_adapter_error() {
    let transport = CannedTransport::replying(vec![
        TransportReply { status: 500, body: "a".to_owned() },
        TransportReply { status: 502, body: "b".to_owned() },
        TransportReply { status: 503, body: "c".to_owned() },
    ]);
    let adapter = OpenAiAdapter::with_transport("gpt-4o", "key", Arc::clone(&transport) as Arc<dyn Transport>)
        .with_retry(fast_retry());

    let req = request(ProviderKind::OpenAi, "gpt-4o");
    let payload = adapter.transform_request(&req).expect("transform");
    let error = adapter.execute(payload).await.expect_err("exhausted");
    assert!(matches!(error, AdapterError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn adapter_does_not_retry_auth_failures() {
    let transport = CannedTransport::replying(vec![TransportReply {
        status: 401,
        body: "bad key sk-ant-supersecretvalue123".to_owned(),
    }]);
    let adapter =
        AnthropicAdapter::with_transport("claude-sonnet-4", "key", Arc::clone(&transport) as Arc<dyn Transport>)
            .with_retry(fast_retry());

    let req = request(ProviderKind::Anthropic, "claude-sonnet-4");
    let payload = adapter.transform_request(&req).expect("transform");
    let error = adapter.execute(payload).await.expect_err("terminal");
    match error {
        AdapterError::HttpStatus { status, body } => {
            assert_eq!(status, 401);
            assert!(!body.contains("supersecret"), "body must be sanitized: {body}");
        }
        other => panic!("expected HttpStatus, got {other}"),
    }
    assert_eq!(transport.calls(), 1);
}
