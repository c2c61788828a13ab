//! Error types shared by the pipeline stages.

use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures reported by a transcript service for a single video.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("no transcript in language '{language}' for video {video_id}")]
    NotFoundInLanguage { video_id: String, language: String },

    #[error("transcripts are disabled for video {0}")]
    Disabled(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TranscriptError {
    fn from(e: reqwest::Error) -> Self {
        Self::Other(format!("request failed: {e}"))
    }
}

/// Failures from the external media tools (yt-dlp, ffmpeg).
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("{tool} exited with {}{}", describe_exit(.exit_code), stderr_suffix(.stderr))]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} did not produce expected output file: {}", .path.display())]
    OutputMissing { tool: String, path: PathBuf },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },

    #[error("unexpected {tool} output: {message}")]
    Parse { tool: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let last = stderr.lines().rev().find(|l| !l.trim().is_empty());
    match last {
        Some(line) => format!(": {}", line.trim()),
        None => String::new(),
    }
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Request-level outcome surfaced to callers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    External(String),
}

impl From<MediaError> for PipelineError {
    fn from(e: MediaError) -> Self {
        Self::External(e.to_string())
    }
}

impl PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            PipelineError::External(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
