//! Glob matching for `applyTo` patterns.
//!
//! Pattern semantics are POSIX shell globbing plus `**` for recursive
//! segment matching:
//!
//! - `*` matches within a single path component
//! - `?` matches any single character
//! - `[abc]` / `[a-z]` match character sets and ranges
//! - `**` matches zero or more whole path components
//!
//! Patterns are matched against forward-slash paths relative to the
//! project root, case-sensitively. A pattern without `/` matches at any
//! depth (equivalent to `**/<pattern>`). Brace alternation (`{a,b}`) is
//! not supported and is rejected at compile time.

use glob::{MatchOptions, Pattern};
use std::path::Path;

use crate::core::ApmError;
use crate::utils::normalize_slashes;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled `applyTo` glob pattern.
///
/// Compilation happens once; matching is a pure string operation with no
/// filesystem access, so the same pattern can be applied to the whole
/// project file list.
#[derive(Debug, Clone)]
pub struct ApplyToPattern {
    original: String,
    pattern: Pattern,
    /// Compiled `**/<pattern>` variant for patterns without a separator,
    /// which match at any depth.
    any_depth: Option<Pattern>,
    /// For patterns with a leading `**/`: the remainder alone, so
    /// zero-directory matches at the project root always succeed.
    root_level: Option<Pattern>,
}

impl ApplyToPattern {
    /// Compile a pattern string.
    ///
    /// # Errors
    ///
    /// [`ApmError::InvalidGlob`] for malformed glob syntax (unbalanced
    /// brackets, `***` runs) or unsupported constructs (braces).
    pub fn new(pattern_str: &str) -> Result<Self, ApmError> {
        let trimmed = pattern_str.trim();
        if trimmed.is_empty() {
            return Err(ApmError::InvalidGlob {
                pattern: pattern_str.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }
        if trimmed.contains('{') || trimmed.contains('}') {
            return Err(ApmError::InvalidGlob {
                pattern: trimmed.to_string(),
                reason: "brace alternation is not supported".to_string(),
            });
        }

        let pattern = Pattern::new(trimmed).map_err(|e| ApmError::InvalidGlob {
            pattern: trimmed.to_string(),
            reason: e.msg.to_string(),
        })?;

        let compile = |text: &str| {
            Pattern::new(text).map_err(|e| ApmError::InvalidGlob {
                pattern: trimmed.to_string(),
                reason: e.msg.to_string(),
            })
        };

        let any_depth = if trimmed.contains('/') {
            None
        } else {
            Some(compile(&format!("**/{trimmed}"))?)
        };
        let root_level = match trimmed.strip_prefix("**/") {
            Some(rest) if !rest.is_empty() => Some(compile(rest)?),
            _ => None,
        };

        Ok(Self {
            original: trimmed.to_string(),
            pattern,
            any_depth,
            root_level,
        })
    }

    /// Match a root-relative path.
    #[must_use]
    pub fn matches(&self, rel_path: &Path) -> bool {
        self.matches_str(&normalize_slashes(rel_path))
    }

    /// Match a forward-slash, root-relative path string.
    #[must_use]
    pub fn matches_str(&self, rel: &str) -> bool {
        if self.pattern.matches_with(rel, MATCH_OPTIONS) {
            return true;
        }
        if self
            .any_depth
            .as_ref()
            .is_some_and(|p| p.matches_with(rel, MATCH_OPTIONS))
        {
            return true;
        }
        self.root_level
            .as_ref()
            .is_some_and(|p| p.matches_with(rel, MATCH_OPTIONS))
    }

    /// The original pattern text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl std::fmt::Display for ApplyToPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> ApplyToPattern {
        ApplyToPattern::new(s).unwrap()
    }

    #[test]
    fn test_star_stays_in_component() {
        let p = pat("docs/*.md");
        assert!(p.matches_str("docs/a.md"));
        assert!(!p.matches_str("docs/sub/a.md"));
        assert!(!p.matches_str("a.md"));
    }

    #[test]
    fn test_double_star_recurses() {
        let p = pat("docs/**/*.md");
        assert!(p.matches_str("docs/a.md"));
        assert!(p.matches_str("docs/sub/a.md"));
        assert!(p.matches_str("docs/sub/deeper/a.md"));
        assert!(!p.matches_str("src/a.md"));
    }

    #[test]
    fn test_leading_double_star() {
        let p = pat("**/*.py");
        assert!(p.matches_str("a.py"));
        assert!(p.matches_str("src/a.py"));
        assert!(p.matches_str("src/sub/a.py"));
        assert!(!p.matches_str("src/a.rs"));
    }

    #[test]
    fn test_bare_pattern_matches_any_depth() {
        let p = pat("*.md");
        assert!(p.matches_str("README.md"));
        assert!(p.matches_str("docs/guide.md"));
        assert!(p.matches_str("docs/sub/deep.md"));
        assert!(!p.matches_str("docs/guide.txt"));
    }

    #[test]
    fn test_exact_name_any_depth() {
        let p = pat("Makefile");
        assert!(p.matches_str("Makefile"));
        assert!(p.matches_str("tools/Makefile"));
        assert!(!p.matches_str("Makefile.bak"));
    }

    #[test]
    fn test_case_sensitive() {
        let p = pat("*.MD");
        assert!(p.matches_str("README.MD"));
        assert!(!p.matches_str("README.md"));
    }

    #[test]
    fn test_character_class() {
        let p = pat("src/agent[0-9].rs");
        assert!(p.matches_str("src/agent7.rs"));
        assert!(!p.matches_str("src/agentx.rs"));
    }

    #[test]
    fn test_question_mark() {
        let p = pat("?.txt");
        assert!(p.matches_str("a.txt"));
        assert!(!p.matches_str("ab.txt"));
    }

    #[test]
    fn test_invalid_brackets_rejected() {
        let err = ApplyToPattern::new("docs/[abc.md").unwrap_err();
        assert!(matches!(err, ApmError::InvalidGlob { .. }));
    }

    #[test]
    fn test_braces_rejected() {
        let err = ApplyToPattern::new("**/*.{ts,tsx}").unwrap_err();
        assert!(err.to_string().contains("brace"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(ApplyToPattern::new("   ").is_err());
    }

    #[test]
    fn test_triple_star_rejected() {
        assert!(ApplyToPattern::new("docs/***/a.md").is_err());
    }
}
