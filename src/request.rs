//! Tool invocation requests: the typed form of one agent tool call.
//!
//! The wire format is a single JSON object (`tool`, `parameters`,
//! `timestamp`, `sessionId`). Parameters are resolved into a tagged
//! variant per tool at construction time, so the rest of the crate never
//! touches loosely-typed JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tools the gate mediates. Anything else passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    Bash,
    Read,
    Edit,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::Bash => "Bash",
            ToolName::Read => "Read",
            ToolName::Edit => "Edit",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bash" => Ok(ToolName::Bash),
            "Read" => Ok(ToolName::Read),
            "Edit" => Ok(ToolName::Edit),
            _ => Err(()),
        }
    }
}

/// Tool-specific parameters, resolved once from the wire JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolParams {
    Bash { command: String },
    Read { file_path: String },
    Edit { file_path: String },
}

impl ToolParams {
    /// The string that rule patterns match against: the command text for
    /// Bash, the target path for Read/Edit. A missing parameter surfaces
    /// here as the empty string, which never matches a non-empty pattern.
    pub fn subject(&self) -> &str {
        match self {
            ToolParams::Bash { command } => command,
            ToolParams::Read { file_path } | ToolParams::Edit { file_path } => file_path,
        }
    }
}

/// One intercepted tool call. Immutable for its whole lifetime; the
/// engine, validators, and audit logger all borrow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocationRequest {
    pub tool: ToolName,
    pub params: ToolParams,
    pub timestamp: String,
    pub session_id: String,
}

impl ToolInvocationRequest {
    pub fn subject(&self) -> &str {
        self.params.subject()
    }

    /// Shorthand for building a Bash request in tests and simple callers.
    pub fn bash(command: impl Into<String>) -> Self {
        Self {
            tool: ToolName::Bash,
            params: ToolParams::Bash {
                command: command.into(),
            },
            timestamp: String::new(),
            session_id: String::new(),
        }
    }

    pub fn read(file_path: impl Into<String>) -> Self {
        Self {
            tool: ToolName::Read,
            params: ToolParams::Read {
                file_path: file_path.into(),
            },
            timestamp: String::new(),
            session_id: String::new(),
        }
    }

    pub fn edit(file_path: impl Into<String>) -> Self {
        Self {
            tool: ToolName::Edit,
            params: ToolParams::Edit {
                file_path: file_path.into(),
            },
            timestamp: String::new(),
            session_id: String::new(),
        }
    }
}

// ── Wire format ──

/// The JSON object delivered on stdin. Missing optional fields default
/// to empty; an unrecognized tool name yields no request (pass-through).
#[derive(Debug, Deserialize)]
pub struct WireRequest {
    pub tool: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "sessionId")]
    pub session_id: String,
}

impl WireRequest {
    /// Resolve the wire object into a typed request, or `None` if the
    /// tool is absent or not one the gate mediates.
    pub fn into_request(self) -> Option<ToolInvocationRequest> {
        let tool: ToolName = self.tool.as_deref()?.parse().ok()?;

        let str_param = |key: &str| -> String {
            self.parameters
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let params = match tool {
            ToolName::Bash => ToolParams::Bash {
                command: str_param("command"),
            },
            ToolName::Read => ToolParams::Read {
                file_path: str_param("filePath"),
            },
            ToolName::Edit => ToolParams::Edit {
                file_path: str_param("filePath"),
            },
        };

        Some(ToolInvocationRequest {
            tool,
            params,
            timestamp: self.timestamp,
            session_id: self.session_id,
        })
    }
}
