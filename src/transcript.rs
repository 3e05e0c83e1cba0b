//! Incremental transcript building
//!
//! Folds the typed event sequence of one chat-style operation into a
//! mutable live view: running text, step log, produced artifacts. The live
//! transcript is the only mutable representation of a turn; on a terminal
//! event it is consumed into an immutable [`Message`].
//!
//! Events are processed strictly in arrival order, no reordering or
//! lookahead. Amendments to the step log always address the most recent
//! `running` entry by index, so a concurrent reader of the snapshot
//! accessors observes a consistent state between events.

use serde_json::Value;

use crate::event::{display_label, AgentEvent, StepOutcome};
use crate::types::{AgentMeta, GeneratedArtifact, Message, StepLogEntry, StepStatus};

/// Result of applying one event
#[derive(Debug)]
pub enum Progress {
    /// Stream still open, live state updated
    Streaming,
    /// Terminal event observed. `Some` carries the committed message;
    /// `None` means the stream ended with nothing worth keeping.
    Finished(Option<Message>),
}

/// Live, uncommitted accumulation of one in-flight streamed response
#[derive(Debug, Default)]
pub struct LiveTranscript {
    text: String,
    steps: Vec<StepLogEntry>,
    artifacts: Vec<GeneratedArtifact>,
    meta: Option<Value>,
    blocks: Option<Value>,
    repair_attempt: Option<u32>,
}

impl LiveTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated response text so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Step log so far
    pub fn steps(&self) -> &[StepLogEntry] {
        &self.steps
    }

    /// Artifacts produced so far
    pub fn artifacts(&self) -> &[GeneratedArtifact] {
        &self.artifacts
    }

    /// Current automatic-repair attempt, if one is in progress
    pub fn repair_attempt(&self) -> Option<u32> {
        self.repair_attempt
    }

    /// Fold one event into the live state
    pub fn apply(&mut self, event: AgentEvent) -> Progress {
        match event {
            AgentEvent::Token { content } => {
                self.text.push_str(&content);
            }
            AgentEvent::Step { tool, label } => {
                // A new tool step implicitly completes the prior one when
                // the server did not emit its own completion.
                if let Some(index) = self.last_running_index() {
                    self.steps[index].status = StepStatus::Success;
                }
                let label = display_label(&tool, label.as_deref());
                self.steps.push(StepLogEntry::running(tool, label));
            }
            AgentEvent::StepDone {
                outcome,
                code,
                stdout,
                error,
                elapsed_secs,
            } => {
                if let Some(index) = self.last_running_index() {
                    let entry = &mut self.steps[index];
                    entry.status = match outcome {
                        StepOutcome::Success => StepStatus::Success,
                        StepOutcome::Error => StepStatus::Error,
                    };
                    // Merge: fields already streamed mid-step win over the
                    // completion payload, so partial output is never lost.
                    entry.code = entry.code.take().or(code);
                    entry.stdout = entry.stdout.take().or(stdout);
                    entry.error = error.or(entry.error.take());
                    entry.elapsed_secs = elapsed_secs.or(entry.elapsed_secs);
                }
            }
            AgentEvent::CodeGenerating => {
                if let Some(index) = self.last_running_index() {
                    self.steps[index].label = "Generating code…".to_string();
                }
            }
            AgentEvent::CodeWritten { code } => {
                if let Some(index) = self.last_running_index() {
                    self.steps[index].code = Some(code);
                }
            }
            AgentEvent::CodeStdout { line } => {
                if let Some(index) = self.last_running_index() {
                    self.steps[index].push_stdout_line(&line);
                }
            }
            AgentEvent::Stdout { output } => {
                // Batch fallback for servers that only send output at
                // completion. Never clobbers already-streamed lines.
                if let Some(entry) = self.steps.last_mut() {
                    if entry.stdout.is_none() {
                        entry.stdout = Some(output);
                    }
                }
            }
            AgentEvent::RepairAttempt { attempt } => {
                self.repair_attempt = Some(attempt);
            }
            AgentEvent::RepairSuccess => {
                self.repair_attempt = None;
            }
            AgentEvent::FileReady { artifact } => {
                self.artifacts.push(artifact);
            }
            AgentEvent::Meta { meta } => {
                self.meta = Some(meta);
            }
            AgentEvent::Blocks { blocks } => {
                self.blocks = Some(blocks);
            }
            AgentEvent::Done { elapsed_secs } => {
                return Progress::Finished(self.finalize(elapsed_secs));
            }
            AgentEvent::Error { message } => {
                return Progress::Finished(Some(self.finalize_error(&message)));
            }
        }
        Progress::Streaming
    }

    /// Consume the transcript after a user abort, keeping whatever partial
    /// output had arrived. Returns `None` when nothing had accumulated.
    pub fn into_partial_message(mut self) -> Option<Message> {
        if self.text.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        let meta = self.take_meta(None);
        let mut message = Message::assistant(text);
        if let Some(meta) = meta {
            message = message.with_meta(meta);
        }
        Some(message)
    }

    /// Index of the most recent `running` step entry
    fn last_running_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|entry| entry.status == StepStatus::Running)
    }

    fn finalize(&mut self, elapsed_secs: Option<f64>) -> Option<Message> {
        // The stream ended cleanly; a step left running never completed on
        // the wire, close it out.
        if let Some(index) = self.last_running_index() {
            self.steps[index].status = StepStatus::Success;
        }

        let mut text = std::mem::take(&mut self.text);
        if text.is_empty() {
            text = self
                .meta
                .as_ref()
                .and_then(|m| m.get("response"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
        }
        if text.is_empty() {
            tracing::warn!("stream finished with no text and no meta.response fallback");
            return None;
        }

        let meta = self.take_meta(elapsed_secs);
        let blocks = self.blocks.take();
        let mut message = Message::assistant(text);
        if let Some(meta) = meta {
            message = message.with_meta(meta);
        }
        if let Some(blocks) = blocks {
            message = message.with_blocks(blocks);
        }
        Some(message)
    }

    fn finalize_error(&mut self, reason: &str) -> Message {
        if let Some(index) = self.last_running_index() {
            self.steps[index].status = StepStatus::Error;
        }
        let text = format!("I encountered an error: {}", reason);
        let meta = self.take_meta(None);
        let mut message = Message::assistant(text);
        if let Some(meta) = meta {
            message = message.with_meta(meta);
        }
        message
    }

    /// Drain accumulated metadata into an `AgentMeta`, or `None` when there
    /// is nothing to attach
    fn take_meta(&mut self, elapsed_secs: Option<f64>) -> Option<AgentMeta> {
        let steps = std::mem::take(&mut self.steps);
        let artifacts = std::mem::take(&mut self.artifacts);
        let envelope = self.meta.take();
        if steps.is_empty() && artifacts.is_empty() && envelope.is_none() && elapsed_secs.is_none()
        {
            return None;
        }
        Some(AgentMeta {
            steps,
            artifacts,
            elapsed_secs,
            envelope,
        })
    }
}
