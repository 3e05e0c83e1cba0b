//! Research progress tracking
//!
//! The broad-research operation reports coarse pipeline stages instead of
//! token-level tool detail, so it gets a deliberately simpler reducer than
//! the chat transcript: a fixed, ordered, five-stage machine with monotonic
//! advancement and a plain text buffer.

use crate::event::{AgentEvent, ToolKind};
use crate::transcript::Progress;
use crate::types::Message;

// ─────────────────────────────────────────────────────────────────────────────
// Stages
// ─────────────────────────────────────────────────────────────────────────────

/// The closed research pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchStage {
    Planning,
    Searching,
    Extracting,
    Clustering,
    Writing,
}

impl ResearchStage {
    pub const ALL: [ResearchStage; 5] = [
        Self::Planning,
        Self::Searching,
        Self::Extracting,
        Self::Clustering,
        Self::Writing,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Planning => "Planning",
            Self::Searching => "Searching",
            Self::Extracting => "Extracting",
            Self::Clustering => "Clustering",
            Self::Writing => "Writing",
        }
    }

    /// Fixed tool-to-stage table. Tools outside the research vocabulary
    /// map to no stage and are ignored by the reducer.
    fn from_tool(tool: &ToolKind) -> Option<Self> {
        match tool {
            ToolKind::Planner => Some(Self::Planning),
            ToolKind::WebSearch => Some(Self::Searching),
            ToolKind::Extractor | ToolKind::Retrieval => Some(Self::Extracting),
            ToolKind::Cluster => Some(Self::Clustering),
            ToolKind::Writer => Some(Self::Writing),
            _ => None,
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Active,
    Done,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reducer
// ─────────────────────────────────────────────────────────────────────────────

/// Live state of one research operation
#[derive(Debug)]
pub struct ResearchProgress {
    stages: [StageStatus; 5],
    /// Index of the furthest stage ever activated; advancement never
    /// moves backward past it
    cursor: Option<usize>,
    text: String,
}

impl Default for ResearchProgress {
    fn default() -> Self {
        Self {
            stages: [StageStatus::Pending; 5],
            cursor: None,
            text: String::new(),
        }
    }
}

impl ResearchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, stage: ResearchStage) -> StageStatus {
        self.stages[stage.index()]
    }

    /// Stage/status pairs in pipeline order, for rendering
    pub fn stages(&self) -> impl Iterator<Item = (ResearchStage, StageStatus)> + '_ {
        ResearchStage::ALL
            .iter()
            .map(move |stage| (*stage, self.stages[stage.index()]))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fold one event. The research channel only speaks the
    /// `step`/`token`/`meta`/`done`/`error` subset; everything else is
    /// ignored.
    pub fn apply(&mut self, event: AgentEvent) -> Progress {
        match event {
            AgentEvent::Token { content } => {
                self.text.push_str(&content);
            }
            AgentEvent::Step { tool, .. } => {
                if let Some(stage) = ResearchStage::from_tool(&tool) {
                    self.advance(stage.index());
                } else {
                    tracing::debug!(tool = tool.id(), "tool outside research pipeline, ignoring");
                }
            }
            AgentEvent::Meta { .. } => {
                // Completion signal independent of having seen every
                // intermediate step
                self.stages = [StageStatus::Done; 5];
                self.cursor = Some(ResearchStage::ALL.len() - 1);
            }
            AgentEvent::Done { .. } => {
                let text = std::mem::take(&mut self.text);
                if text.is_empty() {
                    return Progress::Finished(None);
                }
                return Progress::Finished(Some(Message::assistant(text)));
            }
            AgentEvent::Error { message } => {
                return Progress::Finished(Some(Message::assistant(format!(
                    "I encountered an error: {}",
                    message
                ))));
            }
            _ => {}
        }
        Progress::Streaming
    }

    /// Keep whatever report text had accumulated when the user aborts
    pub fn into_partial_message(self) -> Option<Message> {
        if self.text.is_empty() {
            None
        } else {
            Some(Message::assistant(self.text))
        }
    }

    /// Monotonic advancement: stages below the target become done, the
    /// target becomes active. A target at or behind the cursor is ignored
    /// rather than allowed to regress completed stages.
    fn advance(&mut self, target: usize) {
        if let Some(cursor) = self.cursor {
            if target <= cursor {
                return;
            }
        }
        for status in self.stages.iter_mut().take(target) {
            *status = StageStatus::Done;
        }
        self.stages[target] = StageStatus::Active;
        self.cursor = Some(target);
    }
}
