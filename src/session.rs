//! Conversation session control
//!
//! Owns the session list for a workspace, the active session id, the
//! committed message list, and the send/research/suggestion flows. All
//! failures are absorbed here and converted into either a visible message
//! or a silent no-op; nothing propagates as an unhandled fault to the
//! surrounding application.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::api::{EventStream, NotebookApi};
use crate::event::AgentEvent;
use crate::operation::{OperationClass, OperationRegistry};
use crate::research::ResearchProgress;
use crate::transcript::{LiveTranscript, Progress};
use crate::types::{Message, SessionSummary};

/// Delay before the single history-fetch retry (covers a token-refresh
/// race on the backend side)
const HISTORY_RETRY_DELAY: Duration = Duration::from_millis(300);

/// Session titles derive from the first ~30 characters of the message
const TITLE_CHARS: usize = 30;

/// Where the controller is in the send lifecycle. Consulted by the fetch
/// path so a stale history response never clobbers an in-flight send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Idle,
    Sending,
    Streaming,
}

/// Controller for one workspace's conversation threads
pub struct SessionController {
    api: Arc<dyn NotebookApi>,
    workspace: String,
    operations: OperationRegistry,
    sessions: Vec<SessionSummary>,
    active: Option<String>,
    messages: Vec<Message>,
    phase: SendPhase,
}

impl SessionController {
    pub fn new(api: Arc<dyn NotebookApi>, workspace: impl Into<String>) -> Self {
        Self {
            api,
            workspace: workspace.into(),
            operations: OperationRegistry::new(),
            sessions: Vec::new(),
            active: None,
            messages: Vec::new(),
            phase: SendPhase::Idle,
        }
    }

    /// Restore a previously active session (the host owns persistence of
    /// the id across reloads; the backend owns everything else)
    pub fn with_active_session(mut self, session_id: impl Into<String>) -> Self {
        self.active = Some(session_id.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Committed messages of the active session
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> SendPhase {
        self.phase
    }

    /// Clonable handle for triggering aborts from outside the controller
    /// (a Ctrl-C handler, a stop button)
    pub fn operations(&self) -> OperationRegistry {
        self.operations.clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session bookkeeping
    // ─────────────────────────────────────────────────────────────────────

    /// Re-fetch the session list for the workspace
    pub async fn refresh_sessions(&mut self) -> Result<()> {
        self.sessions = self.api.list_sessions(&self.workspace).await?;
        Ok(())
    }

    /// Switch the active session and load its history
    pub async fn select_session(&mut self, session_id: &str) {
        self.active = Some(session_id.to_string());
        self.fetch_history().await;
    }

    /// Load committed history for the active session.
    ///
    /// Suppressed while an operation is live: installing a stale fetch mid
    /// send would clobber the optimistic user message. Network failures are
    /// retried once after a short delay; a second failure shows an empty
    /// thread rather than surfacing an error.
    pub async fn fetch_history(&mut self) {
        if self.phase != SendPhase::Idle {
            tracing::debug!("history fetch suppressed: operation live");
            return;
        }
        let Some(session_id) = self.active.clone() else {
            self.messages.clear();
            return;
        };

        let fetched = match self.api.fetch_history(&session_id).await {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(%err, "history fetch failed, retrying once");
                tokio::time::sleep(HISTORY_RETRY_DELAY).await;
                match self.api.fetch_history(&session_id).await {
                    Ok(messages) => messages,
                    Err(err) => {
                        tracing::warn!(%err, "history fetch failed twice, showing empty thread");
                        self.messages.clear();
                        return;
                    }
                }
            }
        };

        // An operation may have started while we were suspended; its
        // optimistic state wins and the fetch result is discarded.
        if self.phase != SendPhase::Idle {
            tracing::debug!("discarding stale history fetch");
            return;
        }
        self.messages = fetched;
    }

    /// Delete a session. When the active one goes, fall back to the
    /// next-most-recent remaining session, or to no session at all.
    pub async fn delete_session(&mut self, session_id: &str) -> Result<()> {
        self.api.delete_session(session_id).await?;
        self.sessions.retain(|s| s.id != session_id);

        if self.active.as_deref() == Some(session_id) {
            match self.sessions.first() {
                Some(next) => {
                    let next_id = next.id.clone();
                    self.select_session(&next_id).await;
                }
                None => {
                    self.active = None;
                    self.messages.clear();
                }
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Chat
    // ─────────────────────────────────────────────────────────────────────

    /// Send a user message and stream the agent's reply.
    ///
    /// Creates a session lazily when none is active. `on_update` fires
    /// after every folded event so a renderer can mirror the live
    /// transcript. Returns the committed assistant message, if any; the
    /// message is also appended to [`Self::messages`]. A user always sees
    /// a terminal state for their action: failures commit a synthetic
    /// assistant error message.
    pub async fn send(
        &mut self,
        text: &str,
        mut on_update: impl FnMut(&LiveTranscript),
    ) -> Result<Option<Message>> {
        let handle = self.operations.begin(OperationClass::Chat);
        self.phase = SendPhase::Sending;
        self.messages.push(Message::user(text));

        let result = self.open_chat_stream(text).await;
        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(%err, "send failed before streaming");
                let message =
                    Message::assistant(format!("I encountered an error: {}", err));
                self.messages.push(message.clone());
                self.phase = SendPhase::Idle;
                self.operations.finish(&handle);
                return Ok(Some(message));
            }
        };

        self.phase = SendPhase::Streaming;
        let mut stream = stream;
        let mut transcript = LiveTranscript::new();

        let committed = loop {
            tokio::select! {
                biased;
                _ = handle.token().cancelled() => {
                    tracing::debug!("chat stream cancelled, keeping partial output");
                    break transcript.into_partial_message();
                }
                next = futures::StreamExt::next(&mut stream) => match next {
                    Some(Ok(raw)) => {
                        let Some(event) = AgentEvent::from_raw(&raw) else {
                            continue;
                        };
                        match transcript.apply(event) {
                            Progress::Streaming => on_update(&transcript),
                            Progress::Finished(message) => break message,
                        }
                    }
                    Some(Err(err)) => {
                        tracing::error!(%err, "transport failure mid-stream");
                        let event = AgentEvent::Error {
                            message: err.to_string(),
                        };
                        match transcript.apply(event) {
                            Progress::Finished(message) => break message,
                            // Error events are terminal in the reducer
                            Progress::Streaming => break transcript.into_partial_message(),
                        }
                    }
                    // Source closed without a terminal event; keep whatever
                    // arrived, same as a cancellation
                    None => break transcript.into_partial_message(),
                },
            }
        };

        if let Some(ref message) = committed {
            self.messages.push(message.clone());
        }
        self.phase = SendPhase::Idle;
        self.operations.finish(&handle);
        Ok(committed)
    }

    /// Ensure a session exists, then open the chat channel
    async fn open_chat_stream(&mut self, text: &str) -> Result<EventStream> {
        let session_id = match self.active.clone() {
            Some(id) => id,
            None => {
                let title = derive_title(text);
                let session = self.api.create_session(&self.workspace, &title).await?;
                tracing::debug!(session = %session.id, "created session lazily");
                self.active = Some(session.id.clone());
                if let Err(err) = self.refresh_sessions().await {
                    tracing::warn!(%err, "session list refresh failed after create");
                }
                session.id
            }
        };
        self.api.send_message(&session_id, text).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Research
    // ─────────────────────────────────────────────────────────────────────

    /// Run the broad-research pipeline for a query. Coarser than chat: no
    /// step log or artifacts, just stage progress and a final report.
    pub async fn run_research(
        &mut self,
        query: &str,
        mut on_update: impl FnMut(&ResearchProgress),
    ) -> Result<Option<Message>> {
        let handle = self.operations.begin(OperationClass::Research);

        let mut stream = match self.api.run_research(&self.workspace, query).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(%err, "research request failed");
                let message =
                    Message::assistant(format!("I encountered an error: {}", err));
                self.messages.push(message.clone());
                self.operations.finish(&handle);
                return Ok(Some(message));
            }
        };

        let mut progress = ResearchProgress::new();
        let committed = loop {
            tokio::select! {
                biased;
                _ = handle.token().cancelled() => {
                    break progress.into_partial_message();
                }
                next = futures::StreamExt::next(&mut stream) => match next {
                    Some(Ok(raw)) => {
                        let Some(event) = AgentEvent::from_raw(&raw) else {
                            continue;
                        };
                        match progress.apply(event) {
                            Progress::Streaming => on_update(&progress),
                            Progress::Finished(message) => break message,
                        }
                    }
                    Some(Err(err)) => {
                        tracing::error!(%err, "transport failure mid-research");
                        break Some(Message::assistant(format!(
                            "I encountered an error: {}",
                            err
                        )));
                    }
                    None => break progress.into_partial_message(),
                },
            }
        };

        if let Some(ref message) = committed {
            self.messages.push(message.clone());
        }
        self.operations.finish(&handle);
        Ok(committed)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Suggestions
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch suggested follow-up questions for the active session.
    /// Suggestions are ephemeral: cancellation or failure yields an empty
    /// list, never an error message in the thread.
    pub async fn fetch_suggestions(&mut self) -> Result<Vec<String>> {
        let Some(session_id) = self.active.clone() else {
            return Ok(Vec::new());
        };
        let handle = self.operations.begin(OperationClass::Suggestions);

        let mut stream = match self.api.fetch_suggestions(&session_id).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(%err, "suggestion fetch failed");
                self.operations.finish(&handle);
                return Ok(Vec::new());
            }
        };

        let mut text = String::new();
        let suggestions = loop {
            tokio::select! {
                biased;
                _ = handle.token().cancelled() => break Vec::new(),
                next = futures::StreamExt::next(&mut stream) => match next {
                    Some(Ok(raw)) => match AgentEvent::from_raw(&raw) {
                        Some(AgentEvent::Token { content }) => text.push_str(&content),
                        Some(AgentEvent::Done { .. }) => break parse_suggestions(&text),
                        Some(AgentEvent::Error { message }) => {
                            tracing::warn!(%message, "suggestion stream errored");
                            break Vec::new();
                        }
                        _ => {}
                    },
                    Some(Err(err)) => {
                        tracing::warn!(%err, "suggestion stream failed");
                        break Vec::new();
                    }
                    None => break parse_suggestions(&text),
                },
            }
        };

        self.operations.finish(&handle);
        Ok(suggestions)
    }
}

/// Session title from the first ~30 characters of the first message,
/// respecting char boundaries
fn derive_title(text: &str) -> String {
    let mut title: String = text.chars().take(TITLE_CHARS).collect();
    if text.chars().count() > TITLE_CHARS {
        title.push('…');
    }
    title
}

/// Suggestions arrive as a JSON string array; older backends send plain
/// newline-separated text
fn parse_suggestions(text: &str) -> Vec<String> {
    if let Ok(parsed) = serde_json::from_str::<Vec<String>>(text) {
        return parsed;
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockApi, ScriptedStream};
    use crate::types::Role;

    fn controller_with(api: MockApi) -> SessionController {
        SessionController::new(Arc::new(api), "ws-1")
    }

    fn hello_stream() -> ScriptedStream {
        ScriptedStream::new(
            "event: token\ndata: {\"content\":\"Hel\"}\n\n\
             event: token\ndata: {\"content\":\"lo\"}\n\n\
             event: done\ndata: {}\n\n",
        )
    }

    #[test]
    fn test_derive_title_truncates_on_char_boundary() {
        assert_eq!(derive_title("short"), "short");
        let long = "what does the café dataset say about visitor numbers?";
        let title = derive_title(long);
        assert_eq!(title.chars().count(), TITLE_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_parse_suggestions_json_and_lines() {
        assert_eq!(
            parse_suggestions("[\"a\",\"b\"]"),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(
            parse_suggestions("first\n\nsecond\n"),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_send_creates_session_lazily_and_commits_reply() {
        let api = MockApi::new();
        api.queue_chat(hello_stream());
        let mut controller = controller_with(api);

        assert!(controller.active_session().is_none());
        let committed = controller.send("hi there", |_| {}).await.unwrap().unwrap();

        assert!(controller.active_session().is_some());
        assert_eq!(committed.content, "Hello");
        assert_eq!(controller.messages().len(), 2);
        assert_eq!(controller.messages()[0].role, Role::User);
        assert_eq!(controller.messages()[1].content, "Hello");
        assert_eq!(controller.phase(), SendPhase::Idle);
        // Session list was refreshed after the lazy create
        assert_eq!(controller.sessions().len(), 1);
        assert_eq!(controller.sessions()[0].title, "hi there");
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_synthetic_error_message() {
        // No scripted stream queued: send_message errors
        let mut controller = controller_with(MockApi::new());
        let committed = controller.send("hi", |_| {}).await.unwrap().unwrap();
        assert!(committed
            .content
            .starts_with("I encountered an error:"));
        assert_eq!(controller.messages().len(), 2);
        assert_eq!(controller.phase(), SendPhase::Idle);
    }

    #[tokio::test]
    async fn test_server_error_event_commits_error_message() {
        let api = MockApi::new();
        api.queue_chat(ScriptedStream::new(
            "event: token\ndata: {\"content\":\"part\"}\n\n\
             event: error\ndata: {\"message\":\"agent crashed\"}\n\n",
        ));
        let mut controller = controller_with(api);
        let committed = controller.send("hi", |_| {}).await.unwrap().unwrap();
        assert_eq!(committed.content, "I encountered an error: agent crashed");
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_commits_partial_text() {
        let api = MockApi::new();
        api.queue_chat(
            ScriptedStream::new(
                "event: token\ndata: {\"content\":\"Hel\"}\n\n\
                 event: token\ndata: {\"content\":\"lo\"}\n\n",
            )
            .hold_open(),
        );
        let mut controller = controller_with(api);
        let operations = controller.operations();

        let mut seen = 0;
        let committed = controller
            .send("hi", move |transcript| {
                seen += 1;
                if transcript.text() == "Hello" {
                    operations.cancel(OperationClass::Chat);
                }
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(committed.content, "Hello");
        assert_eq!(controller.phase(), SendPhase::Idle);
        assert!(!controller.operations.is_live(OperationClass::Chat));
    }

    #[tokio::test]
    async fn test_cancel_before_any_token_commits_nothing() {
        let api = MockApi::new();
        api.queue_chat(
            ScriptedStream::new("event: step\ndata: {\"tool\":\"web_search\"}\n\n").hold_open(),
        );
        let mut controller = controller_with(api);
        let operations = controller.operations();

        let committed = controller
            .send("hi", move |_| operations.cancel(OperationClass::Chat))
            .await
            .unwrap();

        assert!(committed.is_none());
        // Only the optimistic user message remains
        assert_eq!(controller.messages().len(), 1);
        assert_eq!(controller.messages()[0].role, Role::User);
    }

    #[tokio::test]
    async fn test_stream_closing_without_done_keeps_partial() {
        let api = MockApi::new();
        api.queue_chat(ScriptedStream::new(
            "event: token\ndata: {\"content\":\"cut off\"}\n\n",
        ));
        let mut controller = controller_with(api);
        let committed = controller.send("hi", |_| {}).await.unwrap().unwrap();
        assert_eq!(committed.content, "cut off");
    }

    #[tokio::test]
    async fn test_fetch_history_installs_messages() {
        let api = MockApi::new().with_history(
            "s1",
            vec![Message::user("q"), Message::assistant("a")],
        );
        let mut controller = controller_with(api);
        controller.select_session("s1").await;
        assert_eq!(controller.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_history_retries_once() {
        let api = MockApi::new().with_history("s1", vec![Message::user("q")]);
        api.fail_history_fetches(1);
        let mut controller = controller_with(api);
        controller.select_session("s1").await;
        assert_eq!(controller.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_history_gives_up_after_second_failure() {
        let api = MockApi::new().with_history("s1", vec![Message::user("q")]);
        api.fail_history_fetches(2);
        let mut controller = controller_with(api);
        controller.messages.push(Message::user("stale"));
        controller.active = Some("s1".to_string());
        controller.fetch_history().await;
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_history_suppressed_while_live() {
        let api = MockApi::new().with_history("s1", vec![Message::user("from server")]);
        let mut controller = controller_with(api);
        controller.active = Some("s1".to_string());
        controller.messages.push(Message::user("optimistic"));
        controller.phase = SendPhase::Streaming;

        controller.fetch_history().await;

        assert_eq!(controller.messages().len(), 1);
        assert_eq!(controller.messages()[0].content, "optimistic");
    }

    #[tokio::test]
    async fn test_delete_active_falls_back_to_most_recent_remaining() {
        let api = MockApi::new()
            .with_sessions(vec![
                SessionSummary {
                    id: "s-new".to_string(),
                    title: "newest".to_string(),
                    created_at: String::new(),
                },
                SessionSummary {
                    id: "s-old".to_string(),
                    title: "older".to_string(),
                    created_at: String::new(),
                },
            ])
            .with_history("s-new", vec![Message::user("n")]);
        let mut controller = controller_with(api);
        controller.refresh_sessions().await.unwrap();
        controller.active = Some("s-old".to_string());

        controller.delete_session("s-old").await.unwrap();

        assert_eq!(controller.active_session(), Some("s-new"));
        assert_eq!(controller.sessions().len(), 1);
        assert_eq!(controller.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_last_session_clears_active() {
        let api = MockApi::new().with_sessions(vec![SessionSummary {
            id: "s1".to_string(),
            title: "only".to_string(),
            created_at: String::new(),
        }]);
        let mut controller = controller_with(api);
        controller.refresh_sessions().await.unwrap();
        controller.active = Some("s1".to_string());

        controller.delete_session("s1").await.unwrap();

        assert!(controller.active_session().is_none());
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn test_research_commits_report() {
        let api = MockApi::new();
        api.queue_research(ScriptedStream::new(
            "event: step\ndata: {\"tool\":\"planner\"}\n\n\
             event: step\ndata: {\"tool\":\"web_search\"}\n\n\
             event: token\ndata: {\"content\":\"Findings.\"}\n\n\
             event: meta\ndata: {\"sources\": 3}\n\n\
             event: done\ndata: {}\n\n",
        ));
        let mut controller = controller_with(api);

        let mut activations = Vec::new();
        let committed = controller
            .run_research("topic", |progress| {
                activations.push(
                    progress
                        .stages()
                        .filter(|(_, s)| *s != crate::research::StageStatus::Pending)
                        .count(),
                );
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(committed.content, "Findings.");
        assert_eq!(controller.messages().len(), 1);
        assert!(!activations.is_empty());
    }

    #[tokio::test]
    async fn test_suggestions_parse_json_array() {
        let api = MockApi::new();
        api.queue_suggestions(ScriptedStream::new(
            "event: token\ndata: {\"content\":\"[\\\"What about X?\\\",\\\"And Y?\\\"]\"}\n\n\
             event: done\ndata: {}\n\n",
        ));
        let mut controller = controller_with(api);
        controller.active = Some("s1".to_string());

        let suggestions = controller.fetch_suggestions().await.unwrap();
        assert_eq!(suggestions, vec!["What about X?", "And Y?"]);
    }

    #[tokio::test]
    async fn test_suggestions_without_active_session_are_empty() {
        let mut controller = controller_with(MockApi::new());
        assert!(controller.fetch_suggestions().await.unwrap().is_empty());
    }
}
