//! The six guard stages and their shared pass-or-block carrier.
//!
//! Inbound: [`injection`], [`pii`], [`alignment`]. Outbound: [`schema`],
//! [`grounding`], [`hallucination`]. Stages communicate exclusively through
//! [`StageOutcome`]; none of them panics or returns `Err` into the pipeline.

use crate::types::Violation;

pub mod alignment;
pub mod grounding;
pub mod hallucination;
pub mod injection;
pub mod pii;
pub mod schema;

/// Outcome of one guard stage.
///
/// `Pass` optionally carries the stage's transformed output (the masked
/// request from the PII stage, the typed response from the schema stage).
/// `Block` carries the violations the stage collected; a block is always
/// non-empty.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    /// The stage found nothing to object to.
    Pass(T),
    /// The stage vetoed the call.
    Block(Vec<Violation>),
}

impl<T> StageOutcome<T> {
    /// Whether this outcome lets the call continue.
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }

    /// The violations of a block, empty for a pass.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Pass(_) => &[],
            Self::Block(violations) => violations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InterceptorKind, ViolationCode};

    #[test]
    fn pass_has_no_violations() {
        let outcome: StageOutcome<()> = StageOutcome::Pass(());
        assert!(outcome.is_pass());
        assert!(outcome.violations().is_empty());
    }

    #[test]
    fn block_exposes_violations() {
        let outcome: StageOutcome<()> = StageOutcome::Block(vec![Violation::new(
            ViolationCode::InjectionDetected,
            InterceptorKind::InjectionScanner,
            "matched",
        )]);
        assert!(!outcome.is_pass());
        assert_eq!(outcome.violations().len(), 1);
    }
}
