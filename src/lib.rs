//! Noteflow - streaming client engine for agent-backed notebooks

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod operation;
pub mod research;
pub mod session;
pub mod sse;
pub mod transcript;
pub mod types;

pub use api::{EventStream, HttpApi, MockApi, NotebookApi, ScriptedStream};
pub use config::ClientConfig;
pub use error::{FixSuggestion, NoteflowError};
pub use event::{AgentEvent, StepOutcome, ToolKind};
pub use operation::{OperationClass, OperationHandle, OperationRegistry};
pub use research::{ResearchProgress, ResearchStage, StageStatus};
pub use session::{SendPhase, SessionController};
pub use sse::{RawEvent, SseDecoder};
pub use transcript::{LiveTranscript, Progress};
pub use types::{
    AgentMeta, GeneratedArtifact, Message, Role, SessionSummary, StepLogEntry, StepStatus,
};
