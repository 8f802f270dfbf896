//! Inbound PII redaction.
//!
//! A transformer, not a gate: it always passes, returning a fresh request
//! whose textual fields have PII replaced with bracketed markers. The input
//! request is never mutated. Masking is idempotent -- the markers contain no
//! characters the patterns can re-match.

use regex::{Captures, Regex};

use crate::types::{BlockContent, ContentBlock, MessageContent, ProxyRequest};

/// Replacement marker for email addresses.
pub const EMAIL_MARKER: &str = "[EMAIL]";
/// Replacement marker for payment card numbers.
pub const CARD_MARKER: &str = "[CC]";
/// Replacement marker for US social security numbers.
pub const SSN_MARKER: &str = "[SSN]";
/// Replacement marker for phone numbers.
pub const PHONE_MARKER: &str = "[PHONE]";

/// Pattern-based PII masker. Patterns are applied per text field in a fixed
/// order: email, card, SSN, phone -- so that the looser phone pattern never
/// sees digit runs the earlier patterns already claimed.
#[derive(Debug, Clone)]
pub struct PiiMasker {
    email: Regex,
    card: Regex,
    ssn: Regex,
    phone: Regex,
}

impl Default for PiiMasker {
    fn default() -> Self {
        Self::new()
    }
}

impl PiiMasker {
    /// Compile the masking pattern set.
    pub fn new() -> Self {
        let compile = |source: &str| Regex::new(source).expect("static PII pattern compiles");
        Self {
            email: compile(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            // Visa / MasterCard / Discover prefixes in 4-4-4-4 groupings,
            // plus Amex 4-6-5, with optional space or dash separators.
            card: compile(
                r"\b(?:4\d{3}|5[1-5]\d{2}|6011|65\d{2})(?:[ -]?\d{4}){3}\b|\b3[47]\d{2}[ -]?\d{6}[ -]?\d{5}\b",
            ),
            // Separator-delimited SSN shape; invalid-prefix ranges are
            // excluded in the replacement closure since the regex crate has
            // no lookahead.
            ssn: compile(r"\b(\d{3})[- ](\d{2})[- ](\d{4})\b"),
            phone: compile(
                r"(?:\+\d{1,3}[-. ]?)?(?:\(\d{1,4}\)[-. ]?|\b\d{2,4}[-. ])\d{3,4}[-. ]\d{3,4}\b",
            ),
        }
    }

    /// Mask one text field.
    pub fn mask_text(&self, text: &str) -> String {
        let masked = self.email.replace_all(text, EMAIL_MARKER);
        let masked = self.card.replace_all(&masked, CARD_MARKER);
        let masked = self.ssn.replace_all(&masked, |caps: &Captures<'_>| {
            let area = &caps[1];
            let group = &caps[2];
            let serial = &caps[3];
            let invalid =
                area == "000" || area == "666" || area.starts_with('9') || group == "00" || serial == "0000";
            if invalid {
                caps[0].to_owned()
            } else {
                SSN_MARKER.to_owned()
            }
        });
        let masked = self.phone.replace_all(&masked, PHONE_MARKER);
        masked.into_owned()
    }

    /// Produce a structurally identical request with every textual field
    /// masked. When `redact_pii` is disabled the caller should skip this
    /// stage entirely; the masker itself is unconditional.
    pub fn mask_request(&self, request: &ProxyRequest) -> ProxyRequest {
        let mut masked = request.clone();
        if let Some(system) = masked.system.take() {
            masked.system = Some(self.mask_text(&system));
        }
        for message in &mut masked.messages {
            self.mask_content(&mut message.content);
        }
        masked
    }

    fn mask_content(&self, content: &mut MessageContent) {
        match content {
            MessageContent::Text(text) => *text = self.mask_text(text),
            MessageContent::Blocks(blocks) => self.mask_blocks(blocks),
        }
    }

    fn mask_blocks(&self, blocks: &mut [ContentBlock]) {
        for block in blocks {
            if let Some(text) = &mut block.text {
                *text = self.mask_text(text);
            }
            match &mut block.content {
                Some(BlockContent::Text(text)) => *text = self.mask_text(text),
                Some(BlockContent::Blocks(nested)) => self.mask_blocks(nested),
                None => {}
            }
        }
    }
}
