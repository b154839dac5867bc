//! Source-analysis collaborator: which functions does the target declare?
//!
//! The core only needs "given the target, return the set of declared
//! function names". [`DeclarationScanner`] answers that with line-oriented
//! regexes, each capturing the declared name in its first group.

use crate::call_records::DataError;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

/// Python `def` / `async def` declarations
pub const PYTHON_DEF_PATTERN: &str = r"^\s*(?:async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(";

/// Rust `fn` declarations, with optional visibility and qualifiers
pub const RUST_FN_PATTERN: &str =
    r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+([A-Za-z_][A-Za-z0-9_]*)";

/// Default declaration patterns
pub fn default_patterns() -> Vec<String> {
    vec![PYTHON_DEF_PATTERN.to_string(), RUST_FN_PATTERN.to_string()]
}

/// Enumerates function names declared by a target program
pub trait FunctionDiscovery {
    fn discover(&self, target: &Path) -> Result<HashSet<String>, DataError>;
}

/// Regex-based declaration scanner
#[derive(Debug, Clone)]
pub struct DeclarationScanner {
    patterns: Vec<Regex>,
}

impl DeclarationScanner {
    /// Build a scanner from pattern sources
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(&format!("(?m){}", p.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Names declared in `source`
    pub fn scan(&self, source: &str) -> HashSet<String> {
        self.patterns
            .iter()
            .flat_map(|re| re.captures_iter(source))
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

impl Default for DeclarationScanner {
    fn default() -> Self {
        Self {
            patterns: default_patterns()
                .iter()
                .map(|p| Regex::new(&format!("(?m){}", p)))
                .collect::<Result<Vec<_>, _>>()
                .unwrap_or_default(),
        }
    }
}

impl FunctionDiscovery for DeclarationScanner {
    fn discover(&self, target: &Path) -> Result<HashSet<String>, DataError> {
        let source = std::fs::read_to_string(target).map_err(|source| DataError::Discovery {
            path: target.to_path_buf(),
            source,
        })?;
        let names = self.scan(&source);
        tracing::debug!(path = %target.display(), functions = names.len(), "discovered declarations");
        Ok(names)
    }
}
