//! Conversation data model
//!
//! Committed messages, step logs and generated artifacts.
//! A `Message` is immutable once appended to a session; the only mutable
//! representation of a turn is the live transcript in `transcript.rs`,
//! which is never part of the committed list.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::ToolKind;

/// Counter for locally minted message ids. The backend owns durable ids;
/// local ids only need to be unique within one process.
static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(0);

fn next_local_id() -> String {
    format!("local-{}", NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of one conversation thread, as returned by the session-list call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    /// Server-formatted creation timestamp (kept opaque)
    #[serde(default)]
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One committed turn in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Agent execution metadata (step log, artifacts, elapsed time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_meta: Option<AgentMeta>,
    /// Rich content blocks, opaque to this engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Value>,
}

impl Message {
    /// Create a user message with a locally minted id
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: next_local_id(),
            role: Role::User,
            content: content.into(),
            agent_meta: None,
            blocks: None,
        }
    }

    /// Create an assistant message with a locally minted id
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: next_local_id(),
            role: Role::Assistant,
            content: content.into(),
            agent_meta: None,
            blocks: None,
        }
    }

    pub fn with_meta(mut self, meta: AgentMeta) -> Self {
        self.agent_meta = Some(meta);
        self
    }

    pub fn with_blocks(mut self, blocks: Value) -> Self {
        self.blocks = Some(blocks);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Metadata accumulated while the agent worked on one turn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepLogEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<GeneratedArtifact>,
    /// Server-reported wall time for the whole turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
    /// Raw `meta` envelope from the server (source of the `response`
    /// fallback when no tokens were streamed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<Value>,
}

impl AgentMeta {
    /// Best-effort parse of a server-side `agent_meta` value from the
    /// history-fetch call. Unrecognized shapes degrade to envelope-only.
    pub fn from_value(value: Value) -> Self {
        let steps = value
            .get("steps")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(StepLogEntry::from_value).collect())
            .unwrap_or_default();
        let artifacts = value
            .get("artifacts")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .map(|a| GeneratedArtifact::from_value(a.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let elapsed_secs = value.get("elapsed").and_then(Value::as_f64);
        Self {
            steps,
            artifacts,
            elapsed_secs,
            envelope: Some(value),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Step log
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Success,
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One tool invocation reported by the agent.
///
/// Entries are append-only during a stream; only the most recent `running`
/// entry may be amended in place (code and stdout arrive after the
/// step-start event).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub tool: ToolKind,
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

impl StepLogEntry {
    /// Start a new running entry for a tool invocation
    pub fn running(tool: ToolKind, label: impl Into<String>) -> Self {
        Self {
            tool,
            label: label.into(),
            status: StepStatus::Running,
            code: None,
            stdout: None,
            error: None,
            elapsed_secs: None,
        }
    }

    /// Append one line of captured standard output, newline-joined
    pub fn push_stdout_line(&mut self, line: &str) {
        match &mut self.stdout {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(line);
            }
            None => self.stdout = Some(line.to_string()),
        }
    }

    fn from_value(value: &Value) -> Self {
        let tool = ToolKind::from_id(
            value.get("tool").and_then(Value::as_str).unwrap_or_default(),
        );
        let label = value
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let status = match value.get("status").and_then(Value::as_str) {
            Some("error") => StepStatus::Error,
            Some("running") => StepStatus::Running,
            _ => StepStatus::Success,
        };
        Self {
            tool,
            label,
            status,
            code: value
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string),
            stdout: value
                .get("stdout")
                .and_then(Value::as_str)
                .map(str::to_string),
            error: value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string),
            elapsed_secs: value.get("elapsed").and_then(Value::as_f64),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Artifacts
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a file produced mid-stream (chart image, exported document),
/// surfaced to the user before the stream terminates
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedArtifact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl GeneratedArtifact {
    /// Parse a `file_ready` payload. Field names vary across backend
    /// versions, so each one is probed with fallbacks.
    pub fn from_value(value: Value) -> Self {
        let id = value
            .get("file_id")
            .or_else(|| value.get("id"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            id,
            name: value
                .get("filename")
                .or_else(|| value.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            kind: value
                .get("kind")
                .and_then(Value::as_str)
                .map(str::to_string),
            url: value.get("url").and_then(Value::as_str).map(str::to_string),
        }
    }
}
