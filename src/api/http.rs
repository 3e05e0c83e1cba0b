//! HTTP implementation of the notebook backend contract
//!
//! Plain JSON for the collaborator calls; the three operation endpoints
//! respond with an event-stream body which is fed through [`SseDecoder`]
//! as chunks arrive.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::{EventStream, HistoryEntry, NotebookApi};
use crate::config::ClientConfig;
use crate::error::NoteflowError;
use crate::sse::{RawEvent, SseDecoder};
use crate::types::{Message, SessionSummary};

/// Backend client over HTTP
pub struct HttpApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let mut builder = self.client.request(method, url);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;
        Self::check_status(response)
            .await?
            .json()
            .await
            .with_context(|| format!("GET {} returned unexpected JSON", path))
    }

    /// Open a streaming endpoint and demultiplex its body
    async fn open_stream(&self, path: &str, body: serde_json::Value) -> Result<EventStream> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;
        let response = Self::check_status(response).await?;

        tracing::debug!(path, "stream opened");

        struct StreamState {
            body: futures::stream::BoxStream<'static, reqwest::Result<Vec<u8>>>,
            decoder: SseDecoder,
            ready: std::collections::VecDeque<RawEvent>,
        }

        let state = StreamState {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            decoder: SseDecoder::new(),
            ready: std::collections::VecDeque::new(),
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.ready.pop_front() {
                    return Some((Ok(event), state));
                }
                match state.body.next().await {
                    Some(Ok(bytes)) => state.ready.extend(state.decoder.feed(&bytes)),
                    Some(Err(err)) => {
                        return Some((
                            Err(NoteflowError::Stream(err.to_string()).into()),
                            state,
                        ))
                    }
                    None => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "backend request failed");
        Err(NoteflowError::Api {
            status: status.as_u16(),
            body,
        }
        .into())
    }
}

#[async_trait]
impl NotebookApi for HttpApi {
    async fn list_sessions(&self, workspace: &str) -> Result<Vec<SessionSummary>> {
        self.get_json(&format!("/api/workspaces/{}/sessions", workspace))
            .await
    }

    async fn create_session(&self, workspace: &str, title: &str) -> Result<SessionSummary> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/workspaces/{}/sessions", workspace),
            )
            .json(&json!({ "title": title }))
            .send()
            .await
            .context("session create failed")?;
        Self::check_status(response)
            .await?
            .json()
            .await
            .context("session create returned unexpected JSON")
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/api/sessions/{}", session_id),
            )
            .send()
            .await
            .context("session delete failed")?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn fetch_history(&self, session_id: &str) -> Result<Vec<Message>> {
        let entries: Vec<HistoryEntry> = self
            .get_json(&format!("/api/sessions/{}/messages", session_id))
            .await?;
        Ok(entries.into_iter().map(Message::from).collect())
    }

    async fn send_message(&self, session_id: &str, text: &str) -> Result<EventStream> {
        self.open_stream(
            &format!("/api/sessions/{}/chat", session_id),
            json!({ "message": text }),
        )
        .await
    }

    async fn run_research(&self, workspace: &str, query: &str) -> Result<EventStream> {
        self.open_stream(
            &format!("/api/workspaces/{}/research", workspace),
            json!({ "query": query }),
        )
        .await
    }

    async fn fetch_suggestions(&self, session_id: &str) -> Result<EventStream> {
        self.open_stream(
            &format!("/api/sessions/{}/suggestions", session_id),
            json!({}),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builds_url_from_base() {
        let api = HttpApi::new(ClientConfig::new("http://localhost:8800/", "ws-1"));
        let request = api
            .request(reqwest::Method::GET, "/api/sessions/s1/messages")
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "http://localhost:8800/api/sessions/s1/messages"
        );
    }

    #[test]
    fn test_bearer_auth_applied_when_key_present() {
        let api = HttpApi::new(
            ClientConfig::new("http://localhost:8800", "ws-1").with_api_key("secret"),
        );
        let request = api
            .request(reqwest::Method::GET, "/api/x")
            .build()
            .unwrap();
        let auth = request.headers().get("authorization").unwrap();
        assert_eq!(auth.to_str().unwrap(), "Bearer secret");
    }
}
