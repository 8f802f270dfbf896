//! Skill Registry collaborator boundary.
//!
//! The registry is injected by the caller; the pipeline only asks whether a
//! tool name exists and, when the registry opts in, whether a decoded
//! argument map is acceptable. Absence of a registry means grounding is
//! skipped entirely.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Optional argument-validation capability a registry may expose.
pub trait ArgumentValidator: Send + Sync {
    /// Whether `arguments` is an acceptable argument map for skill `name`.
    fn validate(&self, name: &str, arguments: &Map<String, Value>) -> bool;
}

/// External registry of callable skills.
pub trait SkillRegistry: Send + Sync {
    /// Whether a skill with this name is registered.
    fn has(&self, name: &str) -> bool;

    /// The registry's argument validator, if it has one. The default
    /// registry validates names only.
    fn argument_validator(&self) -> Option<&dyn ArgumentValidator> {
        None
    }
}

/// Name-set registry for deployments without a live skill service.
#[derive(Debug, Clone, Default)]
pub struct StaticSkillRegistry {
    names: HashSet<String>,
}

impl StaticSkillRegistry {
    /// Build a registry from an iterator of skill names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a skill name.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }
}

impl SkillRegistry for StaticSkillRegistry {
    fn has(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}
