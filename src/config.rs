//! Client configuration
//!
//! Read from the environment (`NOTEFLOW_API_URL`, `NOTEFLOW_API_KEY`,
//! `NOTEFLOW_WORKSPACE`); the binary loads a `.env` file first so local
//! development does not need exported variables.

use crate::error::NoteflowError;

/// Connection settings for the notebook backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the backend, e.g. `http://127.0.0.1:8800`
    pub base_url: String,
    /// Bearer token; optional for local backends
    pub api_key: Option<String>,
    /// Workspace (notebook) the sessions belong to
    pub workspace: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, workspace: impl Into<String>) -> Self {
        Self {
            base_url: trim_trailing_slash(base_url.into()),
            api_key: None,
            workspace: workspace.into(),
        }
    }

    /// Read configuration from the environment
    pub fn from_env() -> Result<Self, NoteflowError> {
        let base_url = std::env::var("NOTEFLOW_API_URL")
            .map_err(|_| NoteflowError::Config("NOTEFLOW_API_URL not set".to_string()))?;
        let workspace = std::env::var("NOTEFLOW_WORKSPACE")
            .map_err(|_| NoteflowError::Config("NOTEFLOW_WORKSPACE not set".to_string()))?;
        let api_key = std::env::var("NOTEFLOW_API_KEY").ok().filter(|k| !k.is_empty());
        Ok(Self {
            base_url: trim_trailing_slash(base_url),
            api_key,
            workspace,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = ClientConfig::new("http://localhost:8800/", "ws-1");
        assert_eq!(config.base_url, "http://localhost:8800");
        assert_eq!(config.workspace, "ws-1");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_with_api_key() {
        let config = ClientConfig::new("http://localhost:8800", "ws-1").with_api_key("secret");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }
}
