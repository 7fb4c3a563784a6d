//! agent-warden: a mediation layer between an autonomous coding agent and
//! the operating system.
//!
//! Every tool invocation the agent proposes (Bash, Read, Edit) is checked
//! against a configurable rule set and a pipeline of semantic validation
//! checks, producing one of three verdicts: [`eval::verdict::Outcome::Allow`],
//! [`eval::verdict::Outcome::Ask`], or [`eval::verdict::Outcome::Deny`].
//! Every decision is written to an append-only audit log.
//!
//! # Architecture
//!
//! - **[`request`]** — Tool invocation model: tool names, parameters, wire format.
//! - **[`pattern`]** — Glob-style subject matching for rules.
//! - **[`rules`]** — Rule set with deny > ask > allow precedence.
//! - **[`shell`]** — Quote-aware shell decomposition: segments, operators, substitutions.
//! - **[`validate`]** — Validation checks: injection, exfiltration, encoded execution, path escapes, read limits.
//! - **[`eval`]** — Decision engine combining rules and validation.
//! - **[`audit`]** — Append-only JSON-line audit logging with daily rotation.
//! - **[`config`]** — Policy loading: embedded defaults or operator TOML.

/// Append-only audit logging.
pub mod audit;
/// Policy document loading and validation.
pub mod config;
/// Decision engine: rule resolution plus conditional validation.
pub mod eval;
/// Glob-style pattern matching for rule subjects.
pub mod pattern;
/// Tool invocation request model and wire format.
pub mod request;
/// Ordered rule set with mode precedence.
pub mod rules;
/// Quote-aware shell command decomposition.
pub mod shell;
/// Semantic validation checks and the pipeline that runs them.
pub mod validate;

use crate::eval::verdict::Verdict;
use crate::request::ToolInvocationRequest;

/// Build an engine from the embedded default policy and resolve one request.
///
/// This is the main entry point for tests and simple usage. For CLI usage
/// with an operator policy file, build the [`eval::Engine`] directly.
pub fn evaluate(request: &ToolInvocationRequest) -> Verdict {
    let policy = config::Policy::default_policy();
    let engine = eval::Engine::new(policy);
    engine.resolve(request)
}
