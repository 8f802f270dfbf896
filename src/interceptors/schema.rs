//! Outbound canonical-shape enforcement.
//!
//! Adapters hand back an untyped JSON value; this stage validates it field
//! by field against the canonical response shape before anything downstream
//! trusts it. Every failing field contributes its own violation so the
//! caller sees the full damage report, not just the first mismatch.

use serde_json::{json, Value};

use crate::types::{FinishReason, InterceptorKind, ProxyResponse, Violation, ViolationCode};

use super::StageOutcome;

fn mismatch(field: &str, detail: &str) -> Violation {
    Violation::new(
        ViolationCode::SchemaMismatch,
        InterceptorKind::SchemaEnforcer,
        format!("response field '{field}' {detail}"),
    )
    .with_payload(json!({ "field": field }))
}

/// Validate a raw adapter value against the canonical response shape.
///
/// On pass the value is returned typed as [`ProxyResponse`]. On block the
/// violations name every offending field under `SCHEMA_MISMATCH`.
pub fn enforce(raw: &Value, expected_version: u8) -> StageOutcome<ProxyResponse> {
    let Some(object) = raw.as_object() else {
        return StageOutcome::Block(vec![mismatch("$", "is not an object")]);
    };

    let mut violations = Vec::new();

    match object.get("schema_version").and_then(Value::as_u64) {
        Some(version) if version == u64::from(expected_version) => {}
        _ => violations.push(mismatch(
            "schema_version",
            &format!("must equal {expected_version}"),
        )),
    }

    match object.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => {}
        _ => violations.push(mismatch("id", "must be a non-empty string")),
    }

    if object.get("model_used").and_then(Value::as_str).is_none() {
        violations.push(mismatch("model_used", "must be a string"));
    }

    match object.get("content") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => violations.push(mismatch("content", "must be a string or null")),
    }

    match object.get("tool_calls").and_then(Value::as_array) {
        Some(calls) => {
            for (index, call) in calls.iter().enumerate() {
                if call.get("function_name").and_then(Value::as_str).is_none() {
                    violations.push(mismatch(
                        &format!("tool_calls[{index}].function_name"),
                        "must be a string",
                    ));
                }
                if call.get("arguments").and_then(Value::as_str).is_none() {
                    violations.push(mismatch(
                        &format!("tool_calls[{index}].arguments"),
                        "must be a string",
                    ));
                }
            }
        }
        None => violations.push(mismatch("tool_calls", "must be an array")),
    }

    match object.get("finish_reason").and_then(Value::as_str) {
        Some(reason) if FinishReason::parse(reason).is_some() => {}
        _ => violations.push(mismatch(
            "finish_reason",
            "must be one of stop, tool_use, length, content_filter",
        )),
    }

    match object.get("usage").and_then(Value::as_object) {
        Some(usage) => {
            for field in ["input_tokens", "output_tokens"] {
                if usage.get(field).and_then(Value::as_u64).is_none() {
                    violations.push(mismatch(
                        &format!("usage.{field}"),
                        "must be a non-negative integer",
                    ));
                }
            }
            if usage.get("cost_usd").and_then(Value::as_f64).is_none() {
                violations.push(mismatch("usage.cost_usd", "must be a number"));
            }
        }
        None => violations.push(mismatch("usage", "must be an object")),
    }

    if !violations.is_empty() {
        return StageOutcome::Block(violations);
    }

    // All fields validated; typing the value can only fail if validation
    // above and the type definitions drift apart.
    match serde_json::from_value::<ProxyResponse>(raw.clone()) {
        Ok(response) => StageOutcome::Pass(response),
        Err(e) => StageOutcome::Block(vec![mismatch("$", &format!("failed to type: {e}"))]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SCHEMA_VERSION;

    fn valid_raw() -> Value {
        json!({
            "schema_version": 1,
            "id": "req-1",
            "model_used": "claude-sonnet-4",
            "content": "Hi!",
            "tool_calls": [],
            "finish_reason": "stop",
            "usage": { "input_tokens": 10, "output_tokens": 8, "cost_usd": 0.00015 }
        })
    }

    fn blocked_fields(raw: &Value) -> Vec<String> {
        match enforce(raw, SCHEMA_VERSION) {
            StageOutcome::Pass(_) => vec![],
            StageOutcome::Block(violations) => violations
                .iter()
                .map(|v| {
                    v.payload.as_ref().expect("payload")["field"]
                        .as_str()
                        .expect("field name")
                        .to_owned()
                })
                .collect(),
        }
    }

    #[test]
    fn valid_response_passes_typed() {
        let outcome = enforce(&valid_raw(), SCHEMA_VERSION);
        match outcome {
            StageOutcome::Pass(response) => {
                assert_eq!(response.id, "req-1");
                assert_eq!(response.content.as_deref(), Some("Hi!"));
                assert_eq!(response.finish_reason, FinishReason::Stop);
                assert_eq!(response.usage.input_tokens, 10);
            }
            StageOutcome::Block(violations) => panic!("should pass, got {violations:?}"),
        }
    }

    #[test]
    fn null_content_is_explicitly_absent() {
        let mut raw = valid_raw();
        raw["content"] = Value::Null;
        match enforce(&raw, SCHEMA_VERSION) {
            StageOutcome::Pass(response) => assert_eq!(response.content, None),
            StageOutcome::Block(violations) => panic!("should pass, got {violations:?}"),
        }
    }

    #[test]
    fn non_object_is_a_single_violation() {
        let outcome = enforce(&json!("not an object"), SCHEMA_VERSION);
        let violations = outcome.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].code, ViolationCode::SchemaMismatch);
    }

    #[test]
    fn invalid_finish_reason_names_the_field() {
        let mut raw = valid_raw();
        raw["finish_reason"] = json!("invalid_reason");
        assert_eq!(blocked_fields(&raw), vec!["finish_reason"]);
    }

    #[test]
    fn wrong_schema_version_blocks() {
        let mut raw = valid_raw();
        raw["schema_version"] = json!(2);
        assert_eq!(blocked_fields(&raw), vec!["schema_version"]);
    }

    #[test]
    fn empty_id_blocks() {
        let mut raw = valid_raw();
        raw["id"] = json!("");
        assert_eq!(blocked_fields(&raw), vec!["id"]);
    }

    #[test]
    fn malformed_tool_call_entries_block_per_field() {
        let mut raw = valid_raw();
        raw["tool_calls"] = json!([
            { "function_name": "ok", "arguments": "{}" },
            { "function_name": 42 },
        ]);
        assert_eq!(
            blocked_fields(&raw),
            vec!["tool_calls[1].function_name", "tool_calls[1].arguments"]
        );
    }

    #[test]
    fn usage_field_violations_collect() {
        let mut raw = valid_raw();
        raw["usage"] = json!({ "input_tokens": -1, "output_tokens": "8" });
        assert_eq!(
            blocked_fields(&raw),
            vec!["usage.input_tokens", "usage.output_tokens", "usage.cost_usd"]
        );
    }

    #[test]
    fn multiple_failures_all_reported() {
        let raw = json!({
            "schema_version": 1,
            "id": "",
            "model_used": 3,
            "tool_calls": "nope",
            "finish_reason": "stop",
            "usage": { "input_tokens": 1, "output_tokens": 2, "cost_usd": 0.0 }
        });
        assert_eq!(blocked_fields(&raw), vec!["id", "model_used", "tool_calls"]);
    }

    #[test]
    fn tool_call_id_defaults_when_missing() {
        let mut raw = valid_raw();
        raw["tool_calls"] = json!([{ "function_name": "get_weather", "arguments": "{}" }]);
        match enforce(&raw, SCHEMA_VERSION) {
            StageOutcome::Pass(response) => {
                assert_eq!(response.tool_calls[0].id, "");
                assert_eq!(response.tool_calls[0].function_name, "get_weather");
            }
            StageOutcome::Block(violations) => panic!("should pass, got {violations:?}"),
        }
    }
}
