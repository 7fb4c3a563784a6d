//! Glob matching for rule patterns and sensitive-op shapes.
//!
//! Thin wrapper over `glob::Pattern` pinning down the semantics the rule
//! engine relies on: full-subject anchoring (no substring matching unless
//! the pattern itself carries wildcards), case sensitivity, and the
//! invariant that an empty subject never matches a non-empty pattern.

use glob::{Pattern as Glob, PatternError};

/// A compiled rule pattern. Compilation happens once at policy load;
/// a malformed pattern is a fatal configuration error, never a
/// decision-time failure.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    compiled: Glob,
}

impl Pattern {
    pub fn new(text: &str) -> Result<Self, PatternError> {
        Ok(Self {
            raw: text.to_string(),
            compiled: Glob::new(text)?,
        })
    }

    /// Match the full subject. Pure function, no I/O.
    pub fn matches(&self, subject: &str) -> bool {
        // `*` technically matches zero characters, but a missing parameter
        // must fall through to the default step rather than hit a rule.
        if subject.is_empty() {
            return self.raw.is_empty();
        }
        self.compiled.matches(subject)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, subject: &str) -> bool {
        Pattern::new(pattern).unwrap().matches(subject)
    }

    #[test]
    fn literal_full_match() {
        assert!(matches("git status", "git status"));
        assert!(!matches("git status", "git status --short"));
    }

    #[test]
    fn star_spans_any_run() {
        assert!(matches("git push*", "git push origin main"));
        assert!(matches("git push*", "git push"));
        assert!(!matches("git push*", "git pull"));
    }

    #[test]
    fn question_mark_single_char() {
        assert!(matches("rm -r?", "rm -rf"));
        assert!(!matches("rm -r?", "rm -r"));
    }

    #[test]
    fn no_substring_matching() {
        assert!(!matches("push", "git push origin"));
    }

    #[test]
    fn case_sensitive() {
        assert!(!matches("git Push*", "git push"));
    }

    #[test]
    fn path_segment_wildcard() {
        assert!(matches("/home/**/*.rs", "/home/dev/src/main.rs"));
        assert!(!matches("/home/**/*.rs", "/etc/passwd"));
    }

    #[test]
    fn empty_subject_never_matches_nonempty_pattern() {
        assert!(!matches("*", ""));
        assert!(!matches("git*", ""));
        assert!(matches("", ""));
    }

    #[test]
    fn malformed_pattern_is_load_error() {
        assert!(Pattern::new("[unclosed").is_err());
    }
}
