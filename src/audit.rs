//! Audit log collaborator.
//!
//! Writes one structured JSON line per pipeline call to an append-only
//! sink. Entries carry only sanitized data -- the request and response
//! bodies never reach the audit stream, only identifiers, counters, and the
//! violation records (whose payloads are PII-free by contract).

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use crate::types::{InterceptorKind, ProviderKind, Violation};

/// Final disposition of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    /// Every stage passed.
    Pass,
    /// Some stage blocked.
    Blocked,
}

/// Everything the audit log records about one call.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    /// Caller-chosen request identifier.
    pub request_id: String,
    /// Requested provider tag.
    pub provider: ProviderKind,
    /// Requested model.
    pub model: String,
    /// Session identifier, when the caller aggregates cost.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Stages that actually ran, in order.
    pub interceptors: Vec<InterceptorKind>,
    /// Violations surfaced to the caller. Empty on pass.
    pub violations: Vec<Violation>,
    /// Final disposition.
    pub outcome: CallOutcome,
    /// Input tokens reported on the returned response.
    pub input_tokens: u32,
    /// Output tokens reported on the returned response.
    pub output_tokens: u32,
    /// Cost reported on the returned response, USD.
    pub cost_usd: f64,
    /// Wall-clock duration of the pipeline call.
    pub duration_ms: u64,
}

#[derive(Serialize)]
struct AuditEntry<'a> {
    timestamp: String,
    #[serde(flatten)]
    record: &'a CallRecord,
}

/// Append-only JSONL audit sink. Safe for concurrent calls; the writer is
/// serialized behind a mutex.
pub struct AuditLogger {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl AuditLogger {
    /// Create an audit logger that appends to the given file path.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened for append.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// Create an audit logger from an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Append one call record as a JSON line, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the write fails.
    pub fn log_call(&self, record: &CallRecord) -> anyhow::Result<()> {
        let entry = AuditEntry {
            timestamp: Utc::now().to_rfc3339(),
            record,
        };
        let line = serde_json::to_string(&entry)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("audit lock poisoned: {e}"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}
