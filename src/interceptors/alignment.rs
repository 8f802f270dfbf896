//! Inbound project-alignment check.
//!
//! Three pre-flight policy checks run against the masked request: provider
//! allow-list, estimated-cost ceiling, and tool scope. All three always run
//! and their violations are collected into a single block -- alignment does
//! not short-circuit internally.

use serde_json::json;

use crate::config::PolicyConfig;
use crate::skills::SkillRegistry;
use crate::types::{InterceptorKind, ProxyRequest, Violation, ViolationCode};

use super::StageOutcome;

/// Conservative pre-flight pricing assumption: the most expensive tier the
/// proxy fronts, in USD per token.
pub const PREFLIGHT_RATE_USD_PER_TOKEN: f64 = 15.0 / 1_000_000.0;

/// Estimate prompt tokens as ceil(total characters / 4) over the system
/// prompt and every message/block text field.
pub fn estimate_tokens(request: &ProxyRequest) -> u32 {
    let chars: usize = request
        .textual_fragments()
        .iter()
        .fold(0usize, |total, fragment| {
            total.saturating_add(fragment.chars().count())
        });
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Run the three alignment checks.
///
/// A request whose provider is outside the allow-list, whose pre-flight
/// estimate is strictly above the ceiling, or which offers tools the skill
/// registry does not know, blocks with every applicable violation. A cost
/// estimate exactly equal to the ceiling passes. The tool-scope check is
/// skipped silently when no registry is injected.
pub fn check(
    request: &ProxyRequest,
    config: &PolicyConfig,
    skills: Option<&dyn SkillRegistry>,
) -> StageOutcome<()> {
    let mut violations = Vec::new();
    let settings = &config.agnostic_settings;

    if !settings.allowed_providers.contains(&request.provider) {
        violations.push(
            Violation::new(
                ViolationCode::ProviderNotAllowed,
                InterceptorKind::AlignmentChecker,
                format!("provider '{}' is not in the allow-list", request.provider),
            )
            .with_payload(json!({
                "requested": request.provider,
                "allowed": settings.allowed_providers,
            })),
        );
    }

    let estimated_tokens = estimate_tokens(request);
    let estimated_cost = f64::from(estimated_tokens) * PREFLIGHT_RATE_USD_PER_TOKEN;
    if estimated_cost > settings.max_token_spend_per_call {
        violations.push(
            Violation::new(
                ViolationCode::BudgetExceeded,
                InterceptorKind::AlignmentChecker,
                format!(
                    "estimated cost {estimated_cost:.6} USD exceeds the per-call ceiling {:.6} USD",
                    settings.max_token_spend_per_call
                ),
            )
            .with_payload(json!({
                "estimated_tokens": estimated_tokens,
                "estimated_cost_usd": estimated_cost,
                "ceiling_usd": settings.max_token_spend_per_call,
            })),
        );
    }

    if let Some(registry) = skills {
        for tool in &request.tools {
            if !registry.has(&tool.name) {
                violations.push(
                    Violation::new(
                        ViolationCode::ToolNotGrounded,
                        InterceptorKind::AlignmentChecker,
                        format!("tool '{}' is not a registered skill", tool.name),
                    )
                    .with_payload(json!({ "tool": tool.name })),
                );
            }
        }
    }

    if violations.is_empty() {
        StageOutcome::Pass(())
    } else {
        StageOutcome::Block(violations)
    }
}
