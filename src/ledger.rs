//! Cost ledger collaborator.
//!
//! Tracks accumulated USD spend per session identifier for the process
//! lifetime. The read-modify-write on the per-session total is serialized
//! behind a mutex so concurrent pipeline calls cannot lose updates.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// In-memory per-session spend accumulator.
#[derive(Debug, Default)]
pub struct CostLedger {
    totals: Mutex<HashMap<String, f64>>,
}

impl CostLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `cost_usd` to the session's running total.
    pub fn record(&self, session_id: &str, cost_usd: f64) {
        let mut totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = totals.entry(session_id.to_owned()).or_insert(0.0);
        *entry += cost_usd;
    }

    /// The session's accumulated spend; zero for unknown sessions.
    pub fn total(&self, session_id: &str) -> f64 {
        let totals = self.totals.lock().unwrap_or_else(PoisonError::into_inner);
        totals.get(session_id).copied().unwrap_or(0.0)
    }

    /// Whether adding `additional_usd` would push the session's total over
    /// `ceiling_usd`. Pessimistic: callers pass the pre-flight estimate.
    pub fn would_exceed(&self, session_id: &str, additional_usd: f64, ceiling_usd: f64) -> bool {
        self.total(session_id) + additional_usd > ceiling_usd
    }
}
