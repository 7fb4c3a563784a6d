//! Policy document loading.
//!
//! The operator policy is a TOML document: process-wide `[settings]`
//! flags plus an ordered `[[rules]]` array. Loading is all-or-nothing —
//! any unknown tool, unparsable pattern, or unknown mode aborts with a
//! `ConfigError` naming the offending rule, and the process never serves
//! requests from a partially applied policy.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::pattern::Pattern;
use crate::request::ToolName;
use crate::rules::{Rule, RuleMode, RuleSet};

/// Embedded reference policy, used when no `--policy` path is given.
const DEFAULT_POLICY: &str = include_str!("../policy.default.toml");

/// Fatal policy-load failures. Raised at startup, never at decision time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read policy file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("policy document is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("rule {index}: unknown tool {tool:?}")]
    UnknownTool { index: usize, tool: String },

    #[error("rule {index}: unknown mode {mode:?} (expected deny, ask, or allow)")]
    UnknownMode { index: usize, mode: String },

    #[error("rule {index}: malformed pattern {pattern:?}: {source}")]
    BadPattern {
        index: usize,
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Process-wide flags from `[settings]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Allow unmatched requests that pass dynamic validation. When off,
    /// the conservative default verdict is Ask.
    pub auto_allow_sandboxed: bool,
    /// Audit log segments older than this are deleted by the sweep.
    pub retention_days: u32,
    /// Read requests for files larger than this fail validation.
    pub max_read_bytes: u64,
    /// Roots a symlinked edit target may resolve into. Tilde-expanded.
    pub permitted_edit_roots: Vec<String>,
    /// Deadline for a single filesystem check; a stalled filesystem
    /// must deny, not wedge the decision path.
    pub fs_deadline_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_allow_sandboxed: false,
            retention_days: 7,
            max_read_bytes: 100 * 1024 * 1024,
            permitted_edit_roots: vec!["~".into(), "/tmp".into(), "/workspace".into()],
            fs_deadline_ms: 2000,
        }
    }
}

// ── Raw document shape ──

#[derive(Debug, Deserialize)]
struct PolicyDoc {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    rules: Vec<RuleDoc>,
}

#[derive(Debug, Deserialize)]
struct RuleDoc {
    tool: String,
    pattern: String,
    mode: String,
    #[serde(default)]
    reason: String,
}

/// A fully validated policy: settings plus the compiled rule set.
/// Immutable after load; shared read-only across concurrent evaluations.
#[derive(Debug)]
pub struct Policy {
    pub settings: Settings,
    pub rule_set: RuleSet,
}

impl Policy {
    /// Parse and validate a policy document.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let doc: PolicyDoc = toml::from_str(document)?;

        let mut rules = Vec::with_capacity(doc.rules.len());
        for (index, raw) in doc.rules.into_iter().enumerate() {
            let tool: ToolName = raw.tool.parse().map_err(|_| ConfigError::UnknownTool {
                index,
                tool: raw.tool.clone(),
            })?;
            let mode = match raw.mode.as_str() {
                "deny" => RuleMode::Deny,
                "ask" => RuleMode::Ask,
                "allow" => RuleMode::Allow,
                other => {
                    return Err(ConfigError::UnknownMode {
                        index,
                        mode: other.to_string(),
                    });
                }
            };
            let pattern = Pattern::new(&raw.pattern).map_err(|source| ConfigError::BadPattern {
                index,
                pattern: raw.pattern.clone(),
                source,
            })?;
            rules.push(Rule {
                tool,
                pattern,
                mode,
                reason: raw.reason,
            });
        }

        Ok(Self {
            settings: doc.settings,
            rule_set: RuleSet::from_rules(rules),
        })
    }

    /// Load a policy from a file, all-or-nothing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// The embedded reference policy.
    pub fn default_policy() -> Self {
        Self::from_toml(DEFAULT_POLICY).expect("embedded default policy must parse")
    }

    /// Raw TOML source of the embedded reference policy.
    pub fn default_policy_source() -> &'static str {
        DEFAULT_POLICY
    }

    /// Permitted edit roots with `~` expanded against the current home.
    pub fn edit_roots(&self) -> Vec<std::path::PathBuf> {
        self.settings
            .permitted_edit_roots
            .iter()
            .map(|root| std::path::PathBuf::from(shellexpand::tilde(root).into_owned()))
            .collect()
    }
}
