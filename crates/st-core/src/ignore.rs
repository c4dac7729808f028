//! Ignore-pattern matching on entry basenames.
//!
//! Patterns come from `general.ignorePatterns` and are evaluated in order
//! against an entry's basename only, never against its full path:
//!
//! - a pattern containing `*` is a wildcard. It compiles to an anchored,
//!   case-insensitive regex where `*` matches any run of characters and every
//!   other character matches itself literally.
//! - any other pattern must equal the basename exactly.
//!
//! ```
//! use st_core::IgnoreMatcher;
//!
//! let matcher = IgnoreMatcher::new(["node_modules", "*.LOG"]).expect("valid patterns");
//! assert!(matcher.is_ignored("node_modules"));
//! assert!(matcher.is_ignored("build.log"));
//! assert!(!matcher.is_ignored("Node_Modules"));
//! ```

use regex::{Regex, RegexBuilder};

use crate::error::ConfigError;

/// One compiled ignore pattern.
#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Wildcard(Regex),
}

impl Pattern {
    fn compile(raw: &str) -> Result<Self, ConfigError> {
        if !raw.contains('*') {
            return Ok(Self::Exact(raw.to_owned()));
        }

        let body = raw
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        RegexBuilder::new(&format!("^{body}$"))
            .case_insensitive(true)
            .build()
            .map(Self::Wildcard)
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: raw.to_owned(),
                source,
            })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == name,
            Self::Wildcard(regex) => regex.is_match(name),
        }
    }
}

/// Ordered set of compiled ignore patterns.
///
/// Cheap to clone (regexes share their compiled program) and safe to share
/// read-only across concurrent traversal tasks.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
    sources: Vec<String>,
}

impl IgnoreMatcher {
    /// Compiles `patterns` in order.
    ///
    /// Blank patterns are skipped.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::default();
        for raw in patterns {
            let raw = raw.as_ref();
            if raw.trim().is_empty() {
                continue;
            }
            matcher.patterns.push(Pattern::compile(raw)?);
            matcher.sources.push(raw.to_owned());
        }
        Ok(matcher)
    }

    /// Returns `true` if any pattern matches `name`.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches(name))
    }

    /// The patterns as configured, in evaluation order.
    #[inline]
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.sources
    }

    /// Returns `true` if no patterns are configured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
