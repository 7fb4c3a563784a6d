//! Declarative policy rules and their resolution order.
//!
//! A `RuleSet` is built once by the policy loader and never mutated for
//! the life of the process; reload means building a new set and swapping
//! it in. Evaluation order is deny > ask > allow, and within a class the
//! first match in document order wins. Deny precedence is a deliberate
//! conservative bias: a deny rule beats any allow rule, however specific.

use serde::{Deserialize, Serialize};

use crate::pattern::Pattern;
use crate::request::{ToolInvocationRequest, ToolName};

/// Precedence class of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Deny,
    Ask,
    Allow,
}

impl RuleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleMode::Deny => "deny",
            RuleMode::Ask => "ask",
            RuleMode::Allow => "allow",
        }
    }
}

/// One policy statement: a glob over the tool's subject string.
#[derive(Debug, Clone)]
pub struct Rule {
    pub tool: ToolName,
    pub pattern: Pattern,
    pub mode: RuleMode,
    pub reason: String,
}

impl Rule {
    fn applies(&self, tool: ToolName, subject: &str) -> bool {
        self.tool == tool && self.pattern.matches(subject)
    }
}

/// Ordered rules partitioned by precedence class.
#[derive(Debug, Default)]
pub struct RuleSet {
    deny: Vec<Rule>,
    ask: Vec<Rule>,
    allow: Vec<Rule>,
}

impl RuleSet {
    /// Partition rules by class, preserving document order within each.
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let mut set = Self::default();
        for rule in rules {
            match rule.mode {
                RuleMode::Deny => set.deny.push(rule),
                RuleMode::Ask => set.ask.push(rule),
                RuleMode::Allow => set.allow.push(rule),
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.deny.is_empty() && self.ask.is_empty() && self.allow.is_empty()
    }

    pub fn len(&self) -> usize {
        self.deny.len() + self.ask.len() + self.allow.len()
    }

    /// Resolve a request against the rules. `None` means no rule matched
    /// and the engine's default step applies.
    pub fn first_match(&self, request: &ToolInvocationRequest) -> Option<&Rule> {
        let subject = request.subject();
        [&self.deny, &self.ask, &self.allow]
            .into_iter()
            .flatten()
            .find(|rule| rule.applies(request.tool, subject))
    }
}
