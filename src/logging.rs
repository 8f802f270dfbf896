//! Tracing bootstrap for the proxy.
//!
//! The durable per-call record is the audit JSONL sink, not the tracing
//! stream, so there is no log-file layer here: diagnostics go to stderr
//! only, keeping stdout free for the canonical response JSON. Interactive
//! use gets human-readable lines; log scrapers get one JSON object per
//! line. `RUST_LOG` overrides the default filter, which keeps the guard
//! stages at `info` while quieting the HTTP stack under the adapters so
//! retry chatter does not drown the pipeline spans.

use tracing_subscriber::EnvFilter;

/// Diagnostic output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for interactive use.
    Text,
    /// One JSON object per line, for log scrapers.
    Json,
}

/// Default filter directives when `RUST_LOG` is unset: the proxy at
/// `info`, the HTTP client stack at `warn`.
const DEFAULT_DIRECTIVES: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";

/// Install the global stderr subscriber.
///
/// Call once at process start; later calls are ignored (the first
/// subscriber wins).
pub fn init(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        tracing::debug!(%error, "tracing subscriber already installed");
    }
}
