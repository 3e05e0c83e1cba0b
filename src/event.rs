//! Typed agent events
//!
//! Interprets demultiplexed wire records as `AgentEvent`s. The event
//! vocabulary is not version-locked to the client: unknown event names are
//! ignored and missing payload fields default to empty/zero, so a newer
//! backend never crashes an older client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sse::RawEvent;
use crate::types::GeneratedArtifact;

// ─────────────────────────────────────────────────────────────────────────────
// Tool vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Known agent tools, plus a fallback variant carrying the raw identifier
/// so unseen tool ids stay displayable without stringly-typed lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolKind {
    WebSearch,
    Retrieval,
    Python,
    Chart,
    DocumentExport,
    Planner,
    Extractor,
    Cluster,
    Writer,
    Unknown(String),
}

impl ToolKind {
    /// Total mapping from wire tool ids
    pub fn from_id(id: &str) -> Self {
        match id {
            "web_search" | "search" => Self::WebSearch,
            "retrieval" | "knowledge_base" => Self::Retrieval,
            "python_tool" | "python" | "code_interpreter" => Self::Python,
            "chart_tool" | "chart" => Self::Chart,
            "document_export" | "export" => Self::DocumentExport,
            "planner" | "plan" => Self::Planner,
            "extractor" | "extract" => Self::Extractor,
            "cluster" | "clusterer" => Self::Cluster,
            "writer" | "compose" => Self::Writer,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The raw identifier as it appeared on the wire
    pub fn id(&self) -> &str {
        match self {
            Self::WebSearch => "web_search",
            Self::Retrieval => "retrieval",
            Self::Python => "python_tool",
            Self::Chart => "chart_tool",
            Self::DocumentExport => "document_export",
            Self::Planner => "planner",
            Self::Extractor => "extractor",
            Self::Cluster => "cluster",
            Self::Writer => "writer",
            Self::Unknown(id) => id,
        }
    }

    /// Display label for known tools. Unknown tools have no built-in label;
    /// the caller falls back to the payload label, the raw id, or a generic
    /// "Thinking…" in that order.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            Self::WebSearch => Some("Searching the web…"),
            Self::Retrieval => Some("Reading sources…"),
            Self::Python => Some("Running code…"),
            Self::Chart => Some("Drawing a chart…"),
            Self::DocumentExport => Some("Exporting document…"),
            Self::Planner => Some("Planning…"),
            Self::Extractor => Some("Extracting content…"),
            Self::Cluster => Some("Organizing findings…"),
            Self::Writer => Some("Writing…"),
            Self::Unknown(_) => None,
        }
    }
}

impl Serialize for ToolKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for ToolKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Self::from_id(&id))
    }
}

/// Resolve the display label for a step: tool table first, then the label
/// the server sent, then the raw tool id, then a generic placeholder.
pub fn display_label(tool: &ToolKind, payload_label: Option<&str>) -> String {
    if let Some(label) = tool.label() {
        return label.to_string();
    }
    if let Some(label) = payload_label.filter(|l| !l.is_empty()) {
        return label.to_string();
    }
    let id = tool.id();
    if !id.is_empty() {
        return id.to_string();
    }
    "Thinking…".to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal status carried by a `step_done` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Error,
}

/// One typed event from the agent channel
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Incremental response text
    Token { content: String },
    /// A tool invocation started
    Step {
        tool: ToolKind,
        label: Option<String>,
    },
    /// The current tool invocation finished
    StepDone {
        outcome: StepOutcome,
        code: Option<String>,
        stdout: Option<String>,
        error: Option<String>,
        elapsed_secs: Option<f64>,
    },
    /// The agent started writing code for the current step
    CodeGenerating,
    /// Full code text for the current step
    CodeWritten { code: String },
    /// One line of live standard output for the current step
    CodeStdout { line: String },
    /// Batched standard output delivered at step completion
    Stdout { output: String },
    /// The agent is retrying a failed step
    RepairAttempt { attempt: u32 },
    RepairSuccess,
    /// A file became available mid-stream
    FileReady { artifact: GeneratedArtifact },
    /// Metadata envelope for the pending message
    Meta { meta: Value },
    /// Rich content blocks for the pending message
    Blocks { blocks: Value },
    /// Stream finished normally
    Done { elapsed_secs: Option<f64> },
    /// Server-reported terminal failure
    Error { message: String },
}

impl AgentEvent {
    /// Decode a wire record. Unknown names return `None` (forward
    /// compatibility); recognized names never fail, missing fields default.
    pub fn from_raw(raw: &RawEvent) -> Option<Self> {
        let data = &raw.data;
        let event = match raw.name.as_str() {
            "token" => Self::Token {
                content: str_field(data, "content"),
            },
            "step" => Self::Step {
                tool: ToolKind::from_id(&str_field(data, "tool")),
                label: opt_str_field(data, "label"),
            },
            "step_done" => Self::StepDone {
                outcome: match data.get("status").and_then(Value::as_str) {
                    Some("error") => StepOutcome::Error,
                    _ => StepOutcome::Success,
                },
                code: opt_str_field(data, "code"),
                stdout: opt_str_field(data, "stdout"),
                error: opt_str_field(data, "error"),
                elapsed_secs: data.get("elapsed").and_then(Value::as_f64),
            },
            "code_generating" => Self::CodeGenerating,
            "code_written" => Self::CodeWritten {
                code: str_field(data, "code"),
            },
            "code_stdout" => Self::CodeStdout {
                line: str_field(data, "line"),
            },
            "stdout" => Self::Stdout {
                output: str_field(data, "output"),
            },
            "repair_attempt" => Self::RepairAttempt {
                attempt: data
                    .get("attempt")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32,
            },
            "repair_success" => Self::RepairSuccess,
            "file_ready" => Self::FileReady {
                artifact: GeneratedArtifact::from_value(data.clone()),
            },
            "meta" => Self::Meta { meta: data.clone() },
            "blocks" => Self::Blocks {
                blocks: data.get("blocks").cloned().unwrap_or_else(|| data.clone()),
            },
            "done" => Self::Done {
                elapsed_secs: data.get("elapsed").and_then(Value::as_f64),
            },
            "error" => Self::Error {
                message: str_field(data, "message"),
            },
            other => {
                tracing::debug!(event = other, "ignoring unknown event");
                return None;
            }
        };
        Some(event)
    }
}

fn str_field(data: &Value, field: &str) -> String {
    data.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn opt_str_field(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(name: &str, data: Value) -> RawEvent {
        RawEvent {
            name: name.to_string(),
            data,
        }
    }

    #[test]
    fn test_token_event() {
        let event = AgentEvent::from_raw(&raw("token", json!({"content": "Hel"}))).unwrap();
        assert_eq!(
            event,
            AgentEvent::Token {
                content: "Hel".to_string()
            }
        );
    }

    #[test]
    fn test_token_missing_content_defaults_to_empty() {
        let event = AgentEvent::from_raw(&raw("token", json!({}))).unwrap();
        assert_eq!(
            event,
            AgentEvent::Token {
                content: String::new()
            }
        );
    }

    #[test]
    fn test_unknown_event_ignored() {
        assert!(AgentEvent::from_raw(&raw("telemetry", json!({"x": 1}))).is_none());
    }

    #[test]
    fn test_step_done_defaults_to_success() {
        let event = AgentEvent::from_raw(&raw("step_done", json!({}))).unwrap();
        match event {
            AgentEvent::StepDone { outcome, .. } => assert_eq!(outcome, StepOutcome::Success),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_tool_kind_round_trip() {
        assert_eq!(ToolKind::from_id("python_tool"), ToolKind::Python);
        assert_eq!(ToolKind::from_id("web_search"), ToolKind::WebSearch);
        assert_eq!(
            ToolKind::from_id("shiny_new_tool"),
            ToolKind::Unknown("shiny_new_tool".to_string())
        );
        assert_eq!(ToolKind::from_id("shiny_new_tool").id(), "shiny_new_tool");
    }

    #[test]
    fn test_display_label_fallback_chain() {
        // Known tool: table wins over payload label
        assert_eq!(
            display_label(&ToolKind::Python, Some("custom")),
            "Running code…"
        );
        // Unknown tool with payload label
        assert_eq!(
            display_label(&ToolKind::Unknown("x_tool".into()), Some("Doing X")),
            "Doing X"
        );
        // Unknown tool, no label: raw id
        assert_eq!(
            display_label(&ToolKind::Unknown("x_tool".into()), None),
            "x_tool"
        );
        // Nothing at all
        assert_eq!(
            display_label(&ToolKind::Unknown(String::new()), None),
            "Thinking…"
        );
    }

    #[test]
    fn test_tool_kind_serde_as_string() {
        let entry = serde_json::to_value(ToolKind::Python).unwrap();
        assert_eq!(entry, json!("python_tool"));
        let parsed: ToolKind = serde_json::from_value(json!("web_search")).unwrap();
        assert_eq!(parsed, ToolKind::WebSearch);
    }

    #[test]
    fn test_repair_attempt_parses_number() {
        let event = AgentEvent::from_raw(&raw("repair_attempt", json!({"attempt": 2}))).unwrap();
        assert_eq!(event, AgentEvent::RepairAttempt { attempt: 2 });
    }
}
