//! Error types with fix suggestions

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum NoteflowError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FixSuggestion for NoteflowError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            NoteflowError::Http(_) => {
                Some("Check NOTEFLOW_API_URL points at a running backend")
            }
            NoteflowError::Api { status, .. } if *status == 401 || *status == 403 => {
                Some("Check NOTEFLOW_API_KEY is set and valid")
            }
            NoteflowError::Api { .. } => Some("Check the backend logs for the failing request"),
            NoteflowError::Json(_) => Some("The backend sent an unexpected shape; check client/server versions match"),
            NoteflowError::Stream(_) => Some("Re-send the message; streams are not resumable"),
            NoteflowError::Session(_) => Some("Refresh the session list; the session may have been deleted"),
            NoteflowError::Config(_) => {
                Some("Set NOTEFLOW_API_URL and NOTEFLOW_WORKSPACE (a .env file works too)")
            }
            NoteflowError::Io(_) => Some("Check file path and permissions"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_suggest_api_key() {
        let err = NoteflowError::Api {
            status: 401,
            body: "unauthorized".to_string(),
        };
        assert_eq!(
            err.fix_suggestion(),
            Some("Check NOTEFLOW_API_KEY is set and valid")
        );
    }

    #[test]
    fn test_config_error_display() {
        let err = NoteflowError::Config("missing NOTEFLOW_API_URL".to_string());
        assert_eq!(
            format!("{}", err),
            "Config error: missing NOTEFLOW_API_URL"
        );
        assert!(err.fix_suggestion().is_some());
    }
}
