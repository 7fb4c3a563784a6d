//! Durable audit logging: one JSON line per decision and per execution
//! outcome, with a parallel stream for sensitive operations.
//!
//! The sink is an injected collaborator so the engine's callers can use
//! an in-memory log in tests. The file sink writes daily segments with
//! restrictive permissions; each append is a single write under a mutex,
//! so concurrent sessions never interleave partial lines. A retention
//! sweep runs at segment rotation — never per call — and never touches
//! the currently open segment.
//!
//! Logging must not block the decision path: append failures are
//! escalated loudly to the diagnostic channel and otherwise swallowed.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::eval::verdict::{Outcome, Verdict};
use crate::request::{ToolInvocationRequest, ToolName, ToolParams};

/// Command shapes that always get a sensitive-ops record, whatever the
/// verdict was: remote pushes, package publishes, registry logins.
const SENSITIVE_SHAPES: &[&str] = &[
    "git push*",
    "cargo publish*",
    "npm publish*",
    "npm login*",
    "docker push*",
    "docker login*",
    "gh release create*",
    "twine upload*",
];

static SENSITIVE_PATTERNS: LazyLock<Vec<glob::Pattern>> = LazyLock::new(|| {
    SENSITIVE_SHAPES
        .iter()
        .map(|shape| glob::Pattern::new(shape).expect("static shape"))
        .collect()
});

/// One appended line. Append-only: once written, a record is never
/// rewritten, only aged out by the retention sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub session_id: String,
    pub tool: ToolName,
    pub params: ToolParams,
    pub outcome: Outcome,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
}

impl AuditRecord {
    fn from_parts(request: &ToolInvocationRequest, verdict: &Verdict) -> Self {
        Self {
            timestamp: timestamp_now(),
            session_id: request.session_id.clone(),
            tool: request.tool,
            params: request.params.clone(),
            outcome: verdict.outcome,
            reason: verdict.reason.clone(),
            execution_success: None,
            execution_error: None,
        }
    }

    /// Does this record describe a sensitive operation?
    pub fn is_sensitive(&self) -> bool {
        let ToolParams::Bash { command } = &self.params else {
            return false;
        };
        !command.is_empty()
            && SENSITIVE_PATTERNS
                .iter()
                .any(|pattern| pattern.matches(command))
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit append failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit record not serializable: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where records go. Implementations must serialize appends internally;
/// callers on concurrent sessions share one sink.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;

    fn append_sensitive(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

// ── in-memory sink ──

/// Test double: records held in memory, nothing touches disk.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
    sensitive: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit lock").clone()
    }

    pub fn sensitive_records(&self) -> Vec<AuditRecord> {
        self.sensitive.lock().expect("audit lock").clone()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().expect("audit lock").push(record.clone());
        Ok(())
    }

    fn append_sensitive(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.sensitive
            .lock()
            .expect("audit lock")
            .push(record.clone());
        Ok(())
    }
}

// ── file sink ──

struct OpenSegments {
    day: u64,
    audit: File,
    audit_path: PathBuf,
    sensitive: File,
    sensitive_path: PathBuf,
}

/// Daily JSON-line segments (`audit-YYYY-MM-DD.jsonl`,
/// `sensitive-YYYY-MM-DD.jsonl`) in one directory, mode 0600.
pub struct FileAuditLog {
    dir: PathBuf,
    retention: Duration,
    state: Mutex<Option<OpenSegments>>,
}

impl FileAuditLog {
    pub fn new(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            dir: dir.into(),
            retention: Duration::from_secs(u64::from(retention_days) * 86_400),
            state: Mutex::new(None),
        }
    }

    fn open_segment(&self, prefix: &str, date: &str) -> Result<(File, PathBuf), AuditError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{prefix}-{date}.jsonl"));
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path)?;
        Ok((file, path))
    }

    /// Ensure segments for today are open, rotating and sweeping when
    /// the day rolled over since the last append.
    fn rotate_if_needed<'a>(
        &self,
        state: &'a mut Option<OpenSegments>,
    ) -> Result<&'a mut OpenSegments, AuditError> {
        let today = epoch_days();
        if state.as_ref().is_none_or(|s| s.day != today) {
            let date = date_string(today);
            let (audit, audit_path) = self.open_segment("audit", &date)?;
            let (sensitive, sensitive_path) = self.open_segment("sensitive", &date)?;
            let segments = OpenSegments {
                day: today,
                audit,
                audit_path,
                sensitive,
                sensitive_path,
            };
            self.sweep(&segments);
            *state = Some(segments);
        }
        Ok(state.as_mut().expect("segments just opened"))
    }

    /// Delete segments older than the retention window. The open
    /// segments are exempt even if the clock says otherwise.
    fn sweep(&self, open: &OpenSegments) {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        let now = SystemTime::now();
        for entry in entries.flatten() {
            let path = entry.path();
            if path == open.audit_path || path == open.sensitive_path {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("audit-") || name.starts_with("sensitive-"))
                || !name.ends_with(".jsonl")
            {
                continue;
            }
            let expired = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .is_some_and(|age| age > self.retention);
            if expired {
                if let Err(e) = std::fs::remove_file(&path) {
                    log::warn!("retention sweep could not delete {}: {e}", path.display());
                }
            }
        }
    }

    fn write_line(file: &mut File, record: &AuditRecord) -> Result<(), AuditError> {
        // Serialize first, then a single write: line-level atomicity
        // under the state mutex.
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl AuditSink for FileAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut state = self.state.lock().expect("audit lock");
        let segments = self.rotate_if_needed(&mut state)?;
        Self::write_line(&mut segments.audit, record)
    }

    fn append_sensitive(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut state = self.state.lock().expect("audit lock");
        let segments = self.rotate_if_needed(&mut state)?;
        Self::write_line(&mut segments.sensitive, record)
    }
}

// ── recorder ──

/// The engine-facing API: build records from request + verdict and hand
/// them to the sink. Failures never propagate to the decision path.
pub struct AuditLogger {
    sink: std::sync::Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: std::sync::Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record the verdict before execution.
    pub fn record_decision(&self, request: &ToolInvocationRequest, verdict: &Verdict) {
        let record = AuditRecord::from_parts(request, verdict);
        if let Err(e) = self.sink.append(&record) {
            log::error!("audit gap: decision record lost: {e}");
        }
    }

    /// Record the execution result after the caller ran the command.
    /// Sensitive operations additionally go to the sensitive stream.
    pub fn record_outcome(
        &self,
        request: &ToolInvocationRequest,
        verdict: &Verdict,
        success: bool,
        error: Option<String>,
    ) {
        let mut record = AuditRecord::from_parts(request, verdict);
        record.execution_success = Some(success);
        record.execution_error = error;
        if let Err(e) = self.sink.append(&record) {
            log::error!("audit gap: outcome record lost: {e}");
        }
        if record.is_sensitive() {
            if let Err(e) = self.sink.append_sensitive(&record) {
                log::error!("audit gap: sensitive record lost: {e}");
            }
        }
    }
}

// ── timestamps ──

fn epoch_days() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        / 86_400
}

fn date_string(days: u64) -> String {
    let (y, m, d) = epoch_days_to_date(days);
    format!("{y:04}-{m:02}-{d:02}")
}

/// UTC timestamp without external deps.
fn timestamp_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (h, m, s) = (secs % 86_400 / 3_600, secs % 3_600 / 60, secs % 60);
    format!("{}T{h:02}:{m:02}:{s:02}Z", date_string(secs / 86_400))
}

/// Civil-from-days (Howard Hinnant's algorithm).
fn epoch_days_to_date(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}
