//! Inbound prompt-injection scan.
//!
//! Matches structural intent -- override, role reassignment, priority
//! inversion, context poisoning -- rather than any specific surface wording.
//! The pattern set is selected by [`SecurityTier`]: the strict tier adds
//! roleplay, hypothetical, and persona-manipulation framings on top of the
//! base categories. The scan is read-only; the request reaching the PII
//! masker is the request the caller handed in.

use regex::Regex;
use serde_json::json;

use crate::types::{InterceptorKind, ProxyRequest, SecurityTier, Violation, ViolationCode};

use super::StageOutcome;

/// Pattern categories applied at every tier.
///
/// Ordered: explicit override, role reassignment, priority inversion,
/// context poisoning.
const BASE_PATTERNS: &[&str] = &[
    // Explicit override: "ignore/disregard/forget ... previous/prior/above/earlier ... instructions"
    r"(?i)\b(?:ignore|disregard|forget)\b[\s\S]{0,40}?\b(?:previous|prior|above|earlier)\b[\s\S]{0,40}?\b(?:instructions?|prompts?|context|commands?)\b",
    // Role reassignment
    r"(?i)\byour\s+(?:real|true|actual|new|primary)\s+(?:role|purpose|goal|task|job|objective)\s+is\b",
    r"(?i)\byou\s+are\s+(?:now|actually|really)\s+an?\b",
    r"(?i)\bact\s+as\s+if\s+you\s+(?:are|were)\b",
    // Priority inversion
    r"(?i)\bas\s+a\s+reminder,?\s+your\s+(?:real|actual|true|primary)\s+task\b",
    r"(?i)\bthe\s+(?:real|actual|true)\s+instructions?\s+(?:are|is|follow)\b",
    // Context poisoning: "[system]" near an override verb, or a literal system tag
    r"(?i)\[system\][\s\S]{0,50}?\b(?:ignore|override|forget|disregard)\b",
    r"(?i)</?system>",
];

/// Additional categories applied only at the strict tier.
const STRICT_PATTERNS: &[&str] = &[
    // Roleplay / fiction framing
    r"(?i)\bin\s+this\s+(?:scenario|roleplay|game|story|fiction)\b[\s\S]{0,30}?\b(?:you\s+are|ignore)\b",
    // Hypothetical framing
    r"(?i)\bhypothetically,?\s+if\s+you\s+(?:were|had\s+no)\b",
    // Pretend / persona manipulation
    r"(?i)\bpretend\s+you\s+(?:are|lack|have\s+no)\b",
];

/// Tier-parameterized injection scanner with a pre-compiled pattern set.
#[derive(Debug, Clone)]
pub struct InjectionScanner {
    patterns: Vec<Regex>,
}

impl InjectionScanner {
    /// Compile the pattern set for the given tier.
    pub fn new(tier: SecurityTier) -> Self {
        let sources: Vec<&str> = match tier {
            SecurityTier::Strict => BASE_PATTERNS
                .iter()
                .chain(STRICT_PATTERNS.iter())
                .copied()
                .collect(),
            SecurityTier::Moderate | SecurityTier::Permissive => BASE_PATTERNS.to_vec(),
        };
        let patterns = sources
            .iter()
            .filter_map(|source| Regex::new(source).ok())
            .collect();
        Self { patterns }
    }

    /// Scan every textual field of the request, in traversal order, against
    /// the tier's pattern set. The first match blocks with a single
    /// [`ViolationCode::InjectionDetected`] violation carrying the request
    /// identifier and the matched pattern source.
    pub fn scan(&self, request: &ProxyRequest) -> StageOutcome<()> {
        for fragment in request.textual_fragments() {
            for pattern in &self.patterns {
                if pattern.is_match(fragment) {
                    let violation = Violation::new(
                        ViolationCode::InjectionDetected,
                        InterceptorKind::InjectionScanner,
                        "request text matched a prompt-injection pattern",
                    )
                    .with_payload(json!({
                        "request_id": request.id,
                        "pattern": pattern.as_str(),
                    }));
                    return StageOutcome::Block(vec![violation]);
                }
            }
        }
        StageOutcome::Pass(())
    }
}
