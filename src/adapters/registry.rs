//! Provider-tag -> adapter resolution with allow-list enforcement.
//!
//! The registry is populated once during startup and read-only afterwards;
//! resolution failures carry the allow-list so callers can surface them as
//! `PROVIDER_NOT_ALLOWED` violations without reconstructing context.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::types::{InterceptorKind, ProviderKind, Violation, ViolationCode};

use super::ProviderAdapter;

/// Adapter resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The tag is outside the configured allow-list.
    #[error("provider '{requested}' is not in the allow-list")]
    NotAllowed {
        /// Requested provider tag.
        requested: ProviderKind,
        /// The configured allow-list.
        allowed: Vec<ProviderKind>,
    },
    /// The tag is allowed but nothing was registered for it.
    #[error("no registered adapter for provider '{requested}'")]
    NotRegistered {
        /// Requested provider tag.
        requested: ProviderKind,
    },
}

impl RegistryError {
    /// The violation-record form of this error.
    pub fn into_violation(self) -> Violation {
        let message = self.to_string();
        let payload = match &self {
            Self::NotAllowed { requested, allowed } => json!({
                "requested": requested,
                "allowed": allowed,
            }),
            Self::NotRegistered { requested } => json!({ "requested": requested }),
        };
        Violation::new(
            ViolationCode::ProviderNotAllowed,
            InterceptorKind::Orchestrator,
            message,
        )
        .with_payload(payload)
    }
}

/// Holds one adapter per provider tag, gated by the policy allow-list.
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    allowed: Vec<ProviderKind>,
}

impl AdapterRegistry {
    /// Create a registry enforcing the given allow-list.
    pub fn new(allowed: Vec<ProviderKind>) -> Self {
        Self {
            adapters: HashMap::new(),
            allowed,
        }
    }

    /// Register the adapter serving a provider tag. Registration happens
    /// during startup only; later registrations replace earlier ones.
    pub fn register(&mut self, provider: ProviderKind, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(provider, adapter);
    }

    /// Resolve the adapter for a provider tag.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotAllowed`] when the tag is outside the allow-list,
    /// [`RegistryError::NotRegistered`] when it is allowed but unregistered.
    pub fn resolve(&self, provider: ProviderKind) -> Result<Arc<dyn ProviderAdapter>, RegistryError> {
        if !self.allowed.contains(&provider) {
            return Err(RegistryError::NotAllowed {
                requested: provider,
                allowed: self.allowed.clone(),
            });
        }
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or(RegistryError::NotRegistered {
                requested: provider,
            })
    }

    /// Provider tags with a registered adapter, in allow-list order.
    pub fn registered(&self) -> Vec<ProviderKind> {
        self.allowed
            .iter()
            .copied()
            .filter(|p| self.adapters.contains_key(p))
            .collect()
    }
}
