//! Ignore-pattern matching
//!
//! Ordered glob patterns from the configuration, compiled once per run.
//! Each pattern carries its own deletion policy: a matching entry is never
//! synchronized, but `allow_deletion` decides whether it may be removed
//! along with its parent directory.

use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

use tidesync_core::config::IgnorePattern;

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: globset::Error,
    },
}

/// One compiled pattern with its policy.
struct CompiledPattern {
    pattern: String,
    matcher: GlobMatcher,
    allow_deletion: bool,
}

/// The result of an ignore lookup: which pattern matched and its policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreMatch<'a> {
    pub pattern: &'a str,
    pub allow_deletion: bool,
}

/// Ordered set of compiled ignore patterns.
///
/// Patterns match against the entry name and against the full relative
/// path, so both `*.tmp` and `build/**` work. First match wins.
pub struct IgnoreMatcher {
    patterns: Vec<CompiledPattern>,
}

impl IgnoreMatcher {
    /// Compile the configured patterns. Fails on the first invalid glob so
    /// a config typo is caught at startup, not silently unmatched.
    pub fn new(patterns: &[IgnorePattern]) -> Result<Self, IgnoreError> {
        let compiled = patterns
            .iter()
            .map(|p| {
                let matcher = GlobBuilder::new(&p.pattern)
                    .literal_separator(false)
                    .build()
                    .map_err(|source| IgnoreError::InvalidPattern {
                        pattern: p.pattern.clone(),
                        source,
                    })?
                    .compile_matcher();
                Ok(CompiledPattern {
                    pattern: p.pattern.clone(),
                    matcher,
                    allow_deletion: p.allow_deletion,
                })
            })
            .collect::<Result<Vec<_>, IgnoreError>>()?;
        Ok(Self { patterns: compiled })
    }

    /// An empty matcher that ignores nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// First pattern matching the entry name or the full relative path.
    #[must_use]
    pub fn matched(&self, rel_path: &str, name: &str) -> Option<IgnoreMatch<'_>> {
        self.patterns
            .iter()
            .find(|p| p.matcher.is_match(name) || p.matcher.is_match(rel_path))
            .map(|p| IgnoreMatch {
                pattern: &p.pattern,
                allow_deletion: p.allow_deletion,
            })
    }

    /// Whether the path is ignored at all.
    #[must_use]
    pub fn is_ignored(&self, rel_path: &str, name: &str) -> bool {
        self.matched(rel_path, name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[(&str, bool)]) -> IgnoreMatcher {
        let patterns: Vec<IgnorePattern> = patterns
            .iter()
            .map(|(pattern, allow_deletion)| IgnorePattern {
                pattern: (*pattern).to_string(),
                allow_deletion: *allow_deletion,
            })
            .collect();
        IgnoreMatcher::new(&patterns).unwrap()
    }

    #[test]
    fn test_name_patterns() {
        let m = matcher(&[("*~", true), (".DS_Store", true)]);
        assert!(m.is_ignored("docs/draft.txt~", "draft.txt~"));
        assert!(m.is_ignored("a/b/.DS_Store", ".DS_Store"));
        assert!(!m.is_ignored("docs/draft.txt", "draft.txt"));
    }

    #[test]
    fn test_path_patterns() {
        let m = matcher(&[("build/*", false)]);
        assert!(m.is_ignored("build/out.o", "out.o"));
        assert!(m.is_ignored("build/deep/out.o", "out.o"));
        assert!(!m.is_ignored("src/main.rs", "main.rs"));
    }

    #[test]
    fn test_first_match_wins_and_carries_policy() {
        let m = matcher(&[("*.tmp", true), ("*", false)]);
        let hit = m.matched("a.tmp", "a.tmp").unwrap();
        assert_eq!(hit.pattern, "*.tmp");
        assert!(hit.allow_deletion);

        let hit = m.matched("a.txt", "a.txt").unwrap();
        assert_eq!(hit.pattern, "*");
        assert!(!hit.allow_deletion);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let patterns = vec![IgnorePattern {
            pattern: "a[".to_string(),
            allow_deletion: false,
        }];
        assert!(IgnoreMatcher::new(&patterns).is_err());
    }
}
