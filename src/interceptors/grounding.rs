//! Outbound tool-call grounding.
//!
//! Every tool call in a validated response must name a skill the injected
//! registry knows; when the registry also validates arguments, the
//! JSON-encoded argument string must decode to a map the validator accepts.
//! Without a registry, grounding is deferred to observability and the stage
//! passes.

use serde_json::{json, Map, Value};

use crate::skills::SkillRegistry;
use crate::types::{InterceptorKind, ProxyResponse, Violation, ViolationCode};

use super::StageOutcome;

fn ungrounded(message: String, payload: Value) -> Violation {
    Violation::new(
        ViolationCode::ToolNotGrounded,
        InterceptorKind::ToolGrounder,
        message,
    )
    .with_payload(payload)
}

/// Ground each tool call of the response against the skill registry.
///
/// Violations for every offending call are collected; any non-empty set is
/// a block. A response without tool calls, or a deployment without a
/// registry, passes.
pub fn ground(response: &ProxyResponse, skills: Option<&dyn SkillRegistry>) -> StageOutcome<()> {
    if response.tool_calls.is_empty() {
        return StageOutcome::Pass(());
    }
    let Some(registry) = skills else {
        return StageOutcome::Pass(());
    };

    let mut violations = Vec::new();
    for call in &response.tool_calls {
        if !registry.has(&call.function_name) {
            violations.push(ungrounded(
                format!("tool call '{}' has no registered skill", call.function_name),
                json!({ "function": call.function_name }),
            ));
            continue;
        }

        if let Some(validator) = registry.argument_validator() {
            match serde_json::from_str::<Map<String, Value>>(&call.arguments) {
                Ok(arguments) => {
                    if !validator.validate(&call.function_name, &arguments) {
                        violations.push(ungrounded(
                            format!(
                                "arguments for '{}' were rejected by the skill registry",
                                call.function_name
                            ),
                            json!({ "function": call.function_name }),
                        ));
                    }
                }
                Err(_) => violations.push(ungrounded(
                    format!(
                        "arguments for '{}' are not a JSON object",
                        call.function_name
                    ),
                    json!({
                        "function": call.function_name,
                        "arguments": call.arguments,
                    }),
                )),
            }
        }
    }

    if violations.is_empty() {
        StageOutcome::Pass(())
    } else {
        StageOutcome::Block(violations)
    }
}
