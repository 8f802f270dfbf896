//! Outbound hallucinated-import scrape.
//!
//! Model-generated code routinely invents packages. When the policy carries
//! a dependency whitelist, this stage extracts every external package
//! reference from the response text (`import … from '…'` and
//! `require('…')` forms) and flags roots the whitelist does not contain.
//! An empty whitelist disables the stage.

use std::collections::HashSet;

use regex::Regex;
use serde_json::json;

use crate::types::{InterceptorKind, ProxyResponse, Violation, ViolationCode};

use super::StageOutcome;

/// Import/require scraper with pre-compiled extraction patterns.
#[derive(Debug, Clone)]
pub struct HallucinationScraper {
    import_form: Regex,
    require_form: Regex,
}

impl Default for HallucinationScraper {
    fn default() -> Self {
        Self::new()
    }
}

impl HallucinationScraper {
    /// Compile the extraction patterns.
    pub fn new() -> Self {
        let compile = |source: &str| Regex::new(source).expect("static import pattern compiles");
        Self {
            import_form: compile(r#"import\s+[^;'"]*?\bfrom\s+['"]([^'"]+)['"]"#),
            require_form: compile(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#),
        }
    }

    /// Scrape the response content for package references outside the
    /// whitelist. Repeated references to the same root produce a single
    /// violation. Relative and absolute specifiers are not packages and are
    /// skipped.
    pub fn scrape(&self, response: &ProxyResponse, whitelist: &[String]) -> StageOutcome<()> {
        if whitelist.is_empty() {
            return StageOutcome::Pass(());
        }
        let Some(content) = &response.content else {
            return StageOutcome::Pass(());
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut violations = Vec::new();

        let specifiers = self
            .import_form
            .captures_iter(content)
            .chain(self.require_form.captures_iter(content))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str());

        for specifier in specifiers {
            if specifier.starts_with('/') || specifier.starts_with('.') {
                continue;
            }
            let root = package_root(specifier);
            if whitelist.iter().any(|allowed| allowed == root) {
                continue;
            }
            if seen.insert(root.to_owned()) {
                violations.push(
                    Violation::new(
                        ViolationCode::HallucinationDetected,
                        InterceptorKind::HallucinationScraper,
                        format!("response references package '{root}' outside the whitelist"),
                    )
                    .with_payload(json!({ "package": root })),
                );
            }
        }

        if violations.is_empty() {
            StageOutcome::Pass(())
        } else {
            StageOutcome::Block(violations)
        }
    }
}

/// The whitelist-comparable root of an import specifier: the first two
/// `/`-separated segments for a scoped package, the first segment otherwise.
fn package_root(specifier: &str) -> &str {
    let mut separators = specifier.match_indices('/');
    if specifier.starts_with('@') {
        match separators.nth(1) {
            Some((index, _)) => &specifier[..index],
            None => specifier,
        }
    } else {
        match separators.next() {
            Some((index, _)) => &specifier[..index],
            None => specifier,
        }
    }
}
