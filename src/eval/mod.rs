//! The decision engine: rule resolution plus dynamic validation, folded
//! into one verdict per request.
//!
//! Order of authority:
//!   1. a matching deny rule is terminal;
//!   2. Edit/Read requests then pass through the validation pipeline
//!      whatever the rules said — a symlink or file size is invisible to
//!      glob patterns, so a failing check overrides even an allow rule;
//!   3. a matching ask/allow rule stands;
//!   4. with no match, the sandboxed auto-allow flag decides: validate
//!      and allow, or fall back to the conservative Ask.
//!
//! The engine holds only immutable state after construction and may be
//! shared freely across concurrent sessions.

pub mod verdict;

pub use verdict::{Outcome, Verdict};

use std::sync::Arc;
use std::time::Duration;

use crate::config::Policy;
use crate::request::{ToolInvocationRequest, ToolName};
use crate::rules::{RuleMode, RuleSet};
use crate::validate::fs::{Filesystem, RealFilesystem};
use crate::validate::Pipeline;

pub struct Engine {
    rules: RuleSet,
    pipeline: Pipeline,
    auto_allow_sandboxed: bool,
}

impl Engine {
    /// Build an engine over the real filesystem, with the deadline from
    /// policy settings.
    pub fn new(policy: Policy) -> Self {
        let deadline = Duration::from_millis(policy.settings.fs_deadline_ms);
        Self::with_filesystem(policy, Arc::new(RealFilesystem::new(deadline)))
    }

    /// Build an engine over an injected filesystem (tests use the stub).
    pub fn with_filesystem(policy: Policy, fs: Arc<dyn Filesystem>) -> Self {
        let pipeline = Pipeline::from_policy(&policy, fs);
        Self {
            rules: policy.rule_set,
            pipeline,
            auto_allow_sandboxed: policy.settings.auto_allow_sandboxed,
        }
    }

    /// Resolve one request to a verdict. Pure given the engine's
    /// immutable state: the same request always yields the same verdict.
    pub fn resolve(&self, request: &ToolInvocationRequest) -> Verdict {
        let matched = self.rules.first_match(request);

        if let Some(rule) = matched
            && rule.mode == RuleMode::Deny
        {
            return Verdict::from_rule(rule);
        }

        // File-touching tools are always validated: the rule saw the
        // path as named, not as resolved, and knows nothing of size.
        let needs_validation = match request.tool {
            ToolName::Edit | ToolName::Read => true,
            ToolName::Bash => matched.is_none() && self.auto_allow_sandboxed,
        };
        if needs_validation
            && let Some(failure) = self.pipeline.validate(request)
        {
            return Verdict::from_failure(failure);
        }

        match matched {
            Some(rule) => Verdict::from_rule(rule),
            None if self.auto_allow_sandboxed => {
                Verdict::allow("default-allow (sandboxed, passed validation)")
            }
            None => Verdict::ask(format!(
                "no rule matched {} request; confirmation required",
                request.tool
            )),
        }
    }
}
