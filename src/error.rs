//! Error types for the arbiter
//!
//! All errors implement `IntoResponse` for Axum handlers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors raised by a single upstream chat completion call
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("transport error talking to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion body: {0}")]
    MalformedBody(String),

    #[error("completion contained no choices")]
    EmptyChoices,

    #[error("stream failed after {chunks_received} chunks: {reason}")]
    Stream {
        chunks_received: usize,
        reason: String,
    },
}

/// Judge output did not follow the tag grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("judge output is missing the <{tag}> tag")]
    MissingTag { tag: String },

    #[error("judge returned unrecognized decision '{value}' (expected 'pick' or 'merge')")]
    UnknownDecision { value: String },
}

/// Pipeline stage, used for error reporting and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Candidates,
    Judge,
    Extract,
    Stream,
}

impl Stage {
    /// Stable label for logs, metrics and error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalize => "normalize",
            Stage::Candidates => "candidates",
            Stage::Judge => "judge",
            Stage::Extract => "extract",
            Stage::Stream => "stream",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config file {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Candidate model #{position} ({model}) failed: {source}")]
    CandidateCall {
        model: String,
        /// 1-based position in the configured candidate list
        position: usize,
        #[source]
        source: CompletionError,
    },

    #[error("Judge model {model} failed: {source}")]
    JudgeCall {
        model: String,
        #[source]
        source: CompletionError,
    },

    #[error("Judge output could not be parsed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Streaming from {model} could not start: {source}")]
    StreamStart {
        model: String,
        #[source]
        source: CompletionError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Which pipeline stage produced this error, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Validation(_) => Some(Stage::Normalize),
            Self::CandidateCall { .. } => Some(Stage::Candidates),
            Self::JudgeCall { .. } => Some(Stage::Judge),
            Self::Extraction(_) => Some(Stage::Extract),
            Self::StreamStart { .. } => Some(Stage::Stream),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::CandidateCall { .. }
            | Self::JudgeCall { .. }
            | Self::Extraction(_)
            | Self::StreamStart { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_)
            | Self::ConfigFileRead { .. }
            | Self::ConfigParseFailed { .. }
            | Self::ConfigValidationFailed { .. }
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "stage": self.stage().map(|s| s.as_str()),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
