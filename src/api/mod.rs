//! # Backend API Boundary
//!
//! Trait and implementations for the notebook backend.
//!
//! The engine issues requests to three streaming operation endpoints
//! (send-message, run-research, fetch-suggestions) and treats their
//! responses identically at the demultiplexer layer: each returns an
//! [`EventStream`] of raw wire events. Differentiation happens only in
//! which reducer consumes the sequence.
//!
//! | Implementation | Use case |
//! |----------------|----------|
//! | [`HttpApi`]    | Production, over reqwest |
//! | [`MockApi`]    | Tests, scripted transcripts |
//!
//! All persisted state (sessions, messages, artifacts) is owned by the
//! backend; this crate holds no on-disk state of its own.

mod http;
mod mock;

pub use http::HttpApi;
pub use mock::{MockApi, ScriptedStream};

use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde_json::Value;

use crate::sse::RawEvent;
use crate::types::{AgentMeta, Message, Role, SessionSummary};

/// Lazy, single-pass, finite sequence of demultiplexed wire events.
/// Not restartable: re-consuming requires re-issuing the request.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RawEvent>> + Send>>;

/// Client-side contract of the notebook backend
#[async_trait]
pub trait NotebookApi: Send + Sync {
    /// Ordered session summaries for a workspace, most recent first
    async fn list_sessions(&self, workspace: &str) -> Result<Vec<SessionSummary>>;

    /// Create a session and return its summary
    async fn create_session(&self, workspace: &str, title: &str) -> Result<SessionSummary>;

    async fn delete_session(&self, session_id: &str) -> Result<()>;

    /// Committed history for a session, oldest first
    async fn fetch_history(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Open the chat/agent event channel for one user message
    async fn send_message(&self, session_id: &str, text: &str) -> Result<EventStream>;

    /// Open the broad-research event channel
    async fn run_research(&self, workspace: &str, query: &str) -> Result<EventStream>;

    /// Open the follow-up-suggestions event channel
    async fn fetch_suggestions(&self, session_id: &str) -> Result<EventStream>;
}

// ─────────────────────────────────────────────────────────────────────────────
// History DTO
// ─────────────────────────────────────────────────────────────────────────────

/// Wire shape of one committed message from the history-fetch call
#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub blocks: Option<Value>,
    #[serde(default)]
    pub agent_meta: Option<Value>,
}

impl From<HistoryEntry> for Message {
    fn from(entry: HistoryEntry) -> Self {
        Message {
            id: entry.id,
            role: match entry.role.as_str() {
                "user" => Role::User,
                _ => Role::Assistant,
            },
            content: entry.content,
            agent_meta: entry.agent_meta.map(AgentMeta::from_value),
            blocks: entry.blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_history_entry_converts_to_message() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "id": "m1",
            "role": "user",
            "content": "hello",
            "created_at": "2026-08-20T10:00:00Z"
        }))
        .unwrap();
        let message: Message = entry.into();
        assert_eq!(message.id, "m1");
        assert_eq!(message.role, Role::User);
        assert_eq!(message.content, "hello");
        assert!(message.agent_meta.is_none());
    }

    #[test]
    fn test_history_entry_unknown_role_becomes_assistant() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "id": "m2",
            "role": "system",
            "content": "x",
            "agent_meta": {"elapsed": 1.0}
        }))
        .unwrap();
        let message: Message = entry.into();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.agent_meta.unwrap().elapsed_secs, Some(1.0));
    }
}
