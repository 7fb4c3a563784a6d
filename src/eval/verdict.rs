//! Verdict types: the engine's answer for one request.

use serde::{Deserialize, Serialize};

use crate::rules::Rule;
use crate::validate::CheckFailure;

/// Final disposition of a request. Deny is a normal value here, never an
/// error: only configuration and logging failures use error signaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Allow,
    Ask,
    Deny,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Allow => "allow",
            Outcome::Ask => "ask",
            Outcome::Deny => "deny",
        }
    }

    /// Process exit status for the decision phase: 0 = allow, 1 = deny.
    /// Ask has no standard encoding in the reference contract; 2 keeps it
    /// distinguishable for callers that want it.
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Allow => 0,
            Outcome::Deny => 1,
            Outcome::Ask => 2,
        }
    }
}

/// The engine's full answer: outcome plus what produced it.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub outcome: Outcome,
    /// The rule that decided, when rule resolution decided.
    pub matched_rule: Option<Rule>,
    /// The check that failed, when dynamic validation decided.
    pub failed_check: Option<&'static str>,
    pub reason: String,
}

impl Verdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Allow,
            matched_rule: None,
            failed_check: None,
            reason: reason.into(),
        }
    }

    pub fn ask(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Ask,
            matched_rule: None,
            failed_check: None,
            reason: reason.into(),
        }
    }

    pub fn from_rule(rule: &Rule) -> Self {
        use crate::rules::RuleMode;
        let outcome = match rule.mode {
            RuleMode::Deny => Outcome::Deny,
            RuleMode::Ask => Outcome::Ask,
            RuleMode::Allow => Outcome::Allow,
        };
        let reason = if rule.reason.is_empty() {
            format!("rule [{}]", rule.pattern.as_str())
        } else {
            rule.reason.clone()
        };
        Self {
            outcome,
            matched_rule: Some(rule.clone()),
            failed_check: None,
            reason,
        }
    }

    pub fn from_failure(failure: CheckFailure) -> Self {
        Self {
            outcome: Outcome::Deny,
            matched_rule: None,
            failed_check: Some(failure.check),
            reason: format!("validation failed [{}]: {}", failure.check, failure.reason),
        }
    }
}
