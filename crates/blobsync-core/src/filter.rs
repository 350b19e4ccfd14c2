//! Scope filtering
//!
//! A [`ScopeFilter`] decides which items take part in synchronization. The
//! same filter is applied to both replicas so an item is either in scope
//! everywhere or nowhere.

use blobsync_fs::ItemPath;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Declarative filter rules, as read from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilterSpec {
    /// Relative directory prefixes excluded together with their contents
    #[serde(default)]
    pub exclude_subdirectories: Vec<String>,
    /// File name globs (`*`, `?`); when non-empty only matching files sync
    #[serde(default)]
    pub include_file_name_patterns: Vec<String>,
    /// Only synchronize files directly under the root
    #[serde(default)]
    pub exclude_directories: bool,
}

#[derive(Debug, Clone)]
struct NamePattern {
    regex: Regex,
}

/// Compiled scope filter.
#[derive(Debug, Clone, Default)]
pub struct ScopeFilter {
    exclude_subdirectories: Vec<ItemPath>,
    include_patterns: Vec<NamePattern>,
    exclude_directories: bool,
}

impl ScopeFilter {
    /// A filter that admits every item.
    pub fn admit_all() -> Self {
        Self::default()
    }

    /// Compile a filter, rejecting invalid prefixes and patterns.
    pub fn from_spec(spec: &ScopeFilterSpec) -> Result<Self> {
        let exclude_subdirectories = spec
            .exclude_subdirectories
            .iter()
            .map(|prefix| {
                ItemPath::new(prefix).map_err(|e| Error::Config {
                    message: format!("excluded subdirectory '{prefix}': {e}"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let include_patterns = spec
            .include_file_name_patterns
            .iter()
            .map(|pattern| compile_glob(pattern))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            exclude_subdirectories,
            include_patterns,
            exclude_directories: spec.exclude_directories,
        })
    }

    /// Decide whether `path` is in scope.
    pub fn admits(&self, path: &ItemPath, is_directory: bool) -> bool {
        if self.exclude_directories && (is_directory || path.depth() > 1) {
            return false;
        }

        if self
            .exclude_subdirectories
            .iter()
            .any(|prefix| path.is_within(prefix))
        {
            return false;
        }

        // Directories stay in scope so files beneath them can still match
        if !is_directory && !self.include_patterns.is_empty() {
            let name = path.file_name();
            return self.include_patterns.iter().any(|p| p.regex.is_match(name));
        }

        true
    }

    /// True when no rule is configured.
    pub fn is_unrestricted(&self) -> bool {
        self.exclude_subdirectories.is_empty()
            && self.include_patterns.is_empty()
            && !self.exclude_directories
    }
}

/// Translate a file name glob into an anchored, case-insensitive regex.
fn compile_glob(pattern: &str) -> Result<NamePattern> {
    let invalid = |reason: &str| Error::Pattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }
    if pattern.contains(['/', '\\']) {
        return Err(invalid("patterns match file names and cannot contain separators"));
    }

    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    let regex = RegexBuilder::new(&expr)
        .case_insensitive(true)
        .build()
        .map_err(|e| invalid(&e.to_string()))?;

    Ok(NamePattern { regex })
}
