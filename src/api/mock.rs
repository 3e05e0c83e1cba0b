//! Mock backend for testing
//!
//! Serves scripted sessions, history and raw wire transcripts without a
//! network. Transcripts go through the real [`SseDecoder`] in configurable
//! chunk sizes, so tests exercise the same demultiplexing path as
//! production. Essential for unit tests and CI pipelines.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;

use super::{EventStream, NotebookApi};
use crate::sse::SseDecoder;
use crate::types::{Message, SessionSummary};

/// One scripted streaming response
#[derive(Debug, Clone)]
pub struct ScriptedStream {
    /// Raw wire text (`event:`/`data:` records)
    pub sse: String,
    /// Chunk size the transcript is delivered in
    pub chunk_size: usize,
    /// Keep the stream open after the scripted records (never yields
    /// again), for cancellation tests
    pub hold_open: bool,
}

impl ScriptedStream {
    pub fn new(sse: impl Into<String>) -> Self {
        Self {
            sse: sse.into(),
            chunk_size: 7,
            hold_open: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    fn into_event_stream(self) -> EventStream {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in self.sse.as_bytes().chunks(self.chunk_size) {
            events.extend(decoder.feed(chunk));
        }
        let base = futures::stream::iter(events.into_iter().map(Ok));
        if self.hold_open {
            Box::pin(base.chain(futures::stream::pending()))
        } else {
            Box::pin(base)
        }
    }
}

/// Mock backend with scripted responses and request recording
#[derive(Default)]
pub struct MockApi {
    sessions: Mutex<Vec<SessionSummary>>,
    history: Mutex<HashMap<String, Vec<Message>>>,
    chat_streams: Mutex<Vec<ScriptedStream>>,
    research_streams: Mutex<Vec<ScriptedStream>>,
    suggestion_streams: Mutex<Vec<ScriptedStream>>,
    /// Messages passed to `send_message`, for assertions
    sent: Mutex<Vec<(String, String)>>,
    /// Fail this many history fetches before succeeding
    history_failures: AtomicU32,
    next_session_id: AtomicU64,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(self, sessions: Vec<SessionSummary>) -> Self {
        *self.sessions.lock().unwrap() = sessions;
        self
    }

    pub fn with_history(self, session_id: &str, messages: Vec<Message>) -> Self {
        self.history
            .lock()
            .unwrap()
            .insert(session_id.to_string(), messages);
        self
    }

    /// Queue a chat stream (FIFO)
    pub fn queue_chat(&self, stream: ScriptedStream) {
        self.chat_streams.lock().unwrap().push(stream);
    }

    pub fn queue_research(&self, stream: ScriptedStream) {
        self.research_streams.lock().unwrap().push(stream);
    }

    pub fn queue_suggestions(&self, stream: ScriptedStream) {
        self.suggestion_streams.lock().unwrap().push(stream);
    }

    /// Make the next N history fetches fail (token-refresh race simulation)
    pub fn fail_history_fetches(&self, count: u32) {
        self.history_failures.store(count, Ordering::SeqCst);
    }

    /// All `(session_id, text)` pairs sent so far
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn pop_stream(queue: &Mutex<Vec<ScriptedStream>>, channel: &str) -> Result<EventStream> {
        let mut queue = queue.lock().unwrap();
        if queue.is_empty() {
            return Err(anyhow!("no scripted {} stream queued", channel));
        }
        Ok(queue.remove(0).into_event_stream())
    }
}

#[async_trait]
impl NotebookApi for MockApi {
    async fn list_sessions(&self, _workspace: &str) -> Result<Vec<SessionSummary>> {
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn create_session(&self, _workspace: &str, title: &str) -> Result<SessionSummary> {
        let id = format!("s-{}", self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let summary = SessionSummary {
            id,
            title: title.to_string(),
            created_at: String::new(),
        };
        // Most recent first, matching the session-list ordering
        self.sessions.lock().unwrap().insert(0, summary.clone());
        Ok(summary)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.lock().unwrap().retain(|s| s.id != session_id);
        self.history.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn fetch_history(&self, session_id: &str) -> Result<Vec<Message>> {
        let remaining = self.history_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.history_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("scripted history failure"));
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, session_id: &str, text: &str) -> Result<EventStream> {
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), text.to_string()));
        Self::pop_stream(&self.chat_streams, "chat")
    }

    async fn run_research(&self, _workspace: &str, _query: &str) -> Result<EventStream> {
        Self::pop_stream(&self.research_streams, "research")
    }

    async fn fetch_suggestions(&self, _session_id: &str) -> Result<EventStream> {
        Self::pop_stream(&self.suggestion_streams, "suggestions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_stream_decodes_records() {
        let api = MockApi::new();
        api.queue_chat(ScriptedStream::new(
            "event: token\ndata: {\"content\":\"hi\"}\n\nevent: done\ndata: {}\n\n",
        ));
        let mut stream = api.send_message("s1", "hello").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.name, "token");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.name, "done");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_send_records_messages() {
        let api = MockApi::new();
        api.queue_chat(ScriptedStream::new("event: done\ndata: {}\n\n"));
        let _ = api.send_message("s1", "hello").await.unwrap();
        assert_eq!(
            api.sent_messages(),
            vec![("s1".to_string(), "hello".to_string())]
        );
    }

    #[tokio::test]
    async fn test_history_failure_injection() {
        let api = MockApi::new().with_history("s1", vec![Message::user("x")]);
        api.fail_history_fetches(1);
        assert!(api.fetch_history("s1").await.is_err());
        assert_eq!(api.fetch_history("s1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_session_prepends() {
        let api = MockApi::new();
        api.create_session("ws", "first").await.unwrap();
        let newest = api.create_session("ws", "second").await.unwrap();
        let sessions = api.list_sessions("ws").await.unwrap();
        assert_eq!(sessions[0].id, newest.id);
        assert_eq!(sessions.len(), 2);
    }
}
