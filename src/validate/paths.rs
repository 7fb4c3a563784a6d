//! Path checks for file-touching tools: symlink escape on Edit, size
//! limit on Read.
//!
//! These run for every Edit/Read request regardless of the rule verdict —
//! a rule pattern matches the path the agent *named*, not the path the
//! filesystem resolves it to, and says nothing about file size.

use std::path::{Path, PathBuf};

use crate::request::{ToolInvocationRequest, ToolName, ToolParams};
use crate::validate::fs::Filesystem;
use crate::validate::{CheckOutcome, ValidationCheck};

/// System directories an edit must not resolve into. A directory the
/// policy explicitly lists as a permitted root is exempted at check
/// construction — for a root user, `~` expands to `/root` and the home
/// directory must stay editable.
const FORBIDDEN_ROOTS: &[&str] = &[
    "/etc", "/usr", "/bin", "/sbin", "/lib", "/boot", "/dev", "/proc", "/sys", "/root",
];

fn file_path_of(request: &ToolInvocationRequest) -> Option<&Path> {
    match &request.params {
        ToolParams::Read { file_path } | ToolParams::Edit { file_path }
            if !file_path.is_empty() =>
        {
            Some(Path::new(file_path))
        }
        _ => None,
    }
}

// ── symlink escape ──

/// If an Edit target is a symlink, its resolved destination must stay
/// inside the permitted roots and outside the forbidden system roots.
/// Non-symlink targets pass; they are what the rule pattern already saw.
pub struct SymlinkEscapeCheck {
    permitted_roots: Vec<PathBuf>,
    forbidden_roots: Vec<PathBuf>,
}

impl SymlinkEscapeCheck {
    pub fn new(permitted_roots: Vec<PathBuf>) -> Self {
        let forbidden_roots = FORBIDDEN_ROOTS
            .iter()
            .map(PathBuf::from)
            .filter(|root| !permitted_roots.contains(root))
            .collect();
        Self {
            permitted_roots,
            forbidden_roots,
        }
    }
}

impl ValidationCheck for SymlinkEscapeCheck {
    fn name(&self) -> &'static str {
        "symlink-escape"
    }

    fn applies_to(&self, tool: ToolName) -> bool {
        tool == ToolName::Edit
    }

    fn run(&self, request: &ToolInvocationRequest, fs: &dyn Filesystem) -> CheckOutcome {
        let Some(path) = file_path_of(request) else {
            return CheckOutcome::Pass;
        };

        // Unanswerable questions fail closed: an unreadable or stalled
        // filesystem must not let an edit through.
        let target = match fs.symlink_target(path) {
            Ok(Some(target)) => target,
            Ok(None) => return CheckOutcome::Pass,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CheckOutcome::Pass,
            Err(e) => {
                return CheckOutcome::fail(format!(
                    "cannot inspect {}: {e}",
                    path.display()
                ));
            }
        };

        let resolved = match fs.canonicalize(path) {
            Ok(resolved) => resolved,
            Err(e) => {
                return CheckOutcome::fail(format!(
                    "cannot resolve symlink {} -> {}: {e}",
                    path.display(),
                    target.display()
                ));
            }
        };

        if let Some(root) = self
            .forbidden_roots
            .iter()
            .find(|root| resolved.starts_with(root))
        {
            return CheckOutcome::fail(format!(
                "symlink target {} lies inside forbidden root {}",
                resolved.display(),
                root.display()
            ));
        }

        if !self.permitted_roots.is_empty()
            && !self
                .permitted_roots
                .iter()
                .any(|root| resolved.starts_with(root))
        {
            return CheckOutcome::fail(format!(
                "symlink target {} lies outside permitted edit roots",
                resolved.display()
            ));
        }

        CheckOutcome::Pass
    }
}

// ── read size ──

/// Bound resource consumption from a single Read: files above the limit
/// fail. Exactly the limit passes.
pub struct ReadSizeCheck {
    max_bytes: u64,
}

impl ReadSizeCheck {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }
}

impl ValidationCheck for ReadSizeCheck {
    fn name(&self) -> &'static str {
        "size-limit"
    }

    fn applies_to(&self, tool: ToolName) -> bool {
        tool == ToolName::Read
    }

    fn run(&self, request: &ToolInvocationRequest, fs: &dyn Filesystem) -> CheckOutcome {
        let Some(path) = file_path_of(request) else {
            return CheckOutcome::Pass;
        };

        match fs.file_size(path) {
            Ok(size) if size <= self.max_bytes => CheckOutcome::Pass,
            Ok(size) => CheckOutcome::fail(format!(
                "{} is {size} bytes, read limit is {} bytes",
                path.display(),
                self.max_bytes
            )),
            // A file that does not exist has nothing to bound; the read
            // itself will surface the error.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckOutcome::Pass,
            Err(e) => CheckOutcome::fail(format!("cannot stat {}: {e}", path.display())),
        }
    }
}
