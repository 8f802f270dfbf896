//! Policy configuration loading and validation.
//!
//! The policy file is JSON, deserialized with serde and then validated
//! field by field. Validation failures are the one startup-time error class
//! allowed to surface as `Err` -- no canonical response exists yet. After
//! [`PolicyConfig::load`] returns, the value is logically frozen: it is
//! owned data with no interior mutability, shared via `Arc`, and no guard
//! stage takes it mutably.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::types::{InterceptorKind, ProviderKind, SecurityTier, Violation, ViolationCode};

/// The policy schema version this build understands.
pub const POLICY_SCHEMA_VERSION: u8 = 1;

/// Configuration errors, each naming the offending field.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The policy file could not be read.
    #[error("failed to read policy file '{path}': {reason}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O failure.
        reason: String,
    },
    /// The file is not valid JSON or does not match the policy shape.
    #[error("policy file does not match the expected shape: {0}")]
    Shape(String),
    /// A field deserialized but failed validation.
    #[error("invalid policy field '{field}': {reason}")]
    Field {
        /// Offending field path.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// The violation-record form of this error, for callers that fold
    /// startup failures into their violation stream.
    pub fn into_violation(self) -> Violation {
        let message = self.to_string();
        let payload = match &self {
            Self::Field { field, .. } => Some(json!({ "field": field })),
            Self::Io { path, .. } => Some(json!({ "path": path })),
            Self::Shape(_) => None,
        };
        let mut violation = Violation::new(
            ViolationCode::ConfigError,
            InterceptorKind::Orchestrator,
            message,
        );
        if let Some(payload) = payload {
            violation = violation.with_payload(payload);
        }
        violation
    }
}

/// Provider-agnostic enforcement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgnosticSettings {
    /// Whether the PII masker runs.
    pub redact_pii: bool,
    /// Pre-flight cost ceiling per call, USD.
    pub max_token_spend_per_call: f64,
    /// Providers this deployment may dispatch to. Never empty.
    pub allowed_providers: Vec<ProviderKind>,
}

/// Free-form audit labels recorded around each call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyHooks {
    /// Labels stamped before dispatch.
    #[serde(default)]
    pub pre_flight: Vec<String>,
    /// Labels stamped after dispatch.
    #[serde(default)]
    pub post_flight: Vec<String>,
}

/// The policy configuration, produced once at startup and held for the
/// process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Project this policy belongs to.
    pub project_name: String,
    /// Injection-scan aggressiveness.
    pub security_tier: SecurityTier,
    /// Must equal [`POLICY_SCHEMA_VERSION`].
    pub schema_version: u8,
    /// Enforcement settings.
    pub agnostic_settings: AgnosticSettings,
    /// Audit labels.
    pub safety_hooks: SafetyHooks,
    /// Package roots the hallucination scraper accepts. Empty disables the
    /// scrape.
    #[serde(default)]
    pub dependency_whitelist: Vec<String>,
}

impl PolicyConfig {
    /// Load and validate a policy file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending field.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "loading policy configuration");
        Self::from_json_str(&contents)
    }

    /// Parse and validate a policy from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the offending field.
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(contents).map_err(|e| ConfigError::Shape(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project_name.trim().is_empty() {
            return Err(ConfigError::Field {
                field: "project_name",
                reason: "must be a non-empty string".to_owned(),
            });
        }
        if self.schema_version != POLICY_SCHEMA_VERSION {
            return Err(ConfigError::Field {
                field: "schema_version",
                reason: format!(
                    "expected {POLICY_SCHEMA_VERSION}, got {}",
                    self.schema_version
                ),
            });
        }
        if !self.agnostic_settings.max_token_spend_per_call.is_finite()
            || self.agnostic_settings.max_token_spend_per_call < 0.0
        {
            return Err(ConfigError::Field {
                field: "agnostic_settings.max_token_spend_per_call",
                reason: "must be a finite non-negative number".to_owned(),
            });
        }
        if self.agnostic_settings.allowed_providers.is_empty() {
            return Err(ConfigError::Field {
                field: "agnostic_settings.allowed_providers",
                reason: "must list at least one provider".to_owned(),
            });
        }
        Ok(())
    }
}
