//! Dynamic validation: pre-execution checks that catch what static rule
//! patterns cannot express.
//!
//! Checks are stateless, named predicates over a request. The pipeline
//! runs them in a fixed order and any `Fail` short-circuits; the engine
//! turns that failure into a Deny. Filesystem-touching checks go through
//! the [`fs::Filesystem`] trait, so a check that cannot get an answer
//! (unreadable path, deadline hit) fails closed rather than passing.

/// Bash command checks: injection, exfiltration, encoded execution.
pub mod bash;
/// Filesystem trait: deadline-bounded real impl and in-memory stub.
pub mod fs;
/// Path checks for Edit (symlink escape) and Read (size limit).
pub mod paths;

use std::sync::Arc;

use crate::config::Policy;
use crate::request::{ToolInvocationRequest, ToolName};
use self::fs::Filesystem;

/// Result of one validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail(String),
}

impl CheckOutcome {
    pub fn fail(reason: impl Into<String>) -> Self {
        CheckOutcome::Fail(reason.into())
    }
}

/// A failed check, carried into the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    /// Stable check name, e.g. `"injection"`.
    pub check: &'static str,
    pub reason: String,
}

/// A named, stateless, side-effect-free predicate over a request.
/// Reading the filesystem through the injected [`Filesystem`] is the
/// only permitted I/O.
pub trait ValidationCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, tool: ToolName) -> bool;

    fn run(&self, request: &ToolInvocationRequest, fs: &dyn Filesystem) -> CheckOutcome;
}

/// The fixed, ordered chain of checks built once at startup.
pub struct Pipeline {
    checks: Vec<Box<dyn ValidationCheck>>,
    fs: Arc<dyn Filesystem>,
}

impl Pipeline {
    pub fn new(checks: Vec<Box<dyn ValidationCheck>>, fs: Arc<dyn Filesystem>) -> Self {
        Self { checks, fs }
    }

    /// The reference check chain, parameterized by policy settings.
    pub fn from_policy(policy: &Policy, fs: Arc<dyn Filesystem>) -> Self {
        Self::new(
            vec![
                Box::new(bash::InjectionCheck),
                Box::new(bash::ExfiltrationCheck),
                Box::new(bash::EncodedExecCheck),
                Box::new(paths::SymlinkEscapeCheck::new(policy.edit_roots())),
                Box::new(paths::ReadSizeCheck::new(policy.settings.max_read_bytes)),
            ],
            fs,
        )
    }

    /// Run every check that applies to the request's tool, in order.
    /// The first failure wins; `None` means all checks passed.
    pub fn validate(&self, request: &ToolInvocationRequest) -> Option<CheckFailure> {
        for check in &self.checks {
            if !check.applies_to(request.tool) {
                continue;
            }
            if let CheckOutcome::Fail(reason) = check.run(request, self.fs.as_ref()) {
                return Some(CheckFailure {
                    check: check.name(),
                    reason,
                });
            }
        }
        None
    }
}
