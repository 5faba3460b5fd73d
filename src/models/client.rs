//! Chat completion client for OpenAI-compatible providers
//!
//! `CompletionService` is the seam the pipeline depends on; the production
//! implementation talks to `/chat/completions` (Groq by default) with reqwest.
//! Tests substitute their own implementations.

use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult, CompletionError};
use crate::pipeline::{Conversation, ConversationTurn};
use async_trait::async_trait;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stream of text deltas from a streaming completion
pub type TokenStream = BoxStream<'static, Result<String, CompletionError>>;

/// Sampling parameters sent with every completion request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Single-shot and streaming chat completions against a named model
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Run a non-streaming completion and return the assistant text
    async fn complete(
        &self,
        model: &str,
        conversation: &Conversation,
        sampling: &SamplingParams,
    ) -> Result<String, CompletionError>;

    /// Start a streaming completion and return its text deltas in arrival order
    async fn stream(
        &self,
        model: &str,
        conversation: &Conversation,
        sampling: &SamplingParams,
    ) -> Result<TokenStream, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// reqwest-backed client for an OpenAI-compatible `/chat/completions` API
///
/// One instance is shared by every request; reqwest pools connections
/// internally, so no locking is needed around it.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    completions_url: String,
    api_key: Option<String>,
}

impl OpenAiCompatClient {
    /// Create a client for `base_url` (e.g. `https://api.groq.com/openai/v1`)
    ///
    /// `api_key` is sent as a bearer token when present. `timeout` bounds each
    /// upstream call; `None` keeps reqwest's default (no timeout).
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            completions_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    /// Create a client from `[provider]` settings and an already-loaded key
    pub fn from_config(provider: &ProviderConfig, api_key: String) -> AppResult<Self> {
        Self::new(
            &provider.base_url,
            Some(api_key),
            provider.upstream_timeout_seconds.map(Duration::from_secs),
        )
    }

    /// Full URL of the completions endpoint
    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    async fn send(
        &self,
        model: &str,
        conversation: &Conversation,
        sampling: &SamplingParams,
        stream: bool,
    ) -> Result<reqwest::Response, CompletionError> {
        let body = ChatCompletionRequest {
            model,
            messages: conversation.turns(),
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            stream,
        };

        let mut request = self.http.post(&self.completions_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| CompletionError::Transport {
                url: self.completions_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: truncate_for_error(&body),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    async fn complete(
        &self,
        model: &str,
        conversation: &Conversation,
        sampling: &SamplingParams,
    ) -> Result<String, CompletionError> {
        tracing::debug!(
            model = %model,
            turns = conversation.len(),
            temperature = sampling.temperature,
            "Sending completion request"
        );

        let response = self.send(model, conversation, sampling, false).await?;
        let text = response
            .text()
            .await
            .map_err(|source| CompletionError::Transport {
                url: self.completions_url.clone(),
                source,
            })?;

        parse_completion_body(&text)
    }

    async fn stream(
        &self,
        model: &str,
        conversation: &Conversation,
        sampling: &SamplingParams,
    ) -> Result<TokenStream, CompletionError> {
        tracing::debug!(
            model = %model,
            turns = conversation.len(),
            "Starting streaming completion request"
        );

        let response = self.send(model, conversation, sampling, true).await?;
        Ok(delta_stream(response.bytes_stream()).boxed())
    }
}

/// Extract the assistant text from a non-streaming completion body
fn parse_completion_body(body: &str) -> Result<String, CompletionError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
        CompletionError::MalformedBody(format!("{} (body: {})", e, truncate_for_error(body)))
    })?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or(CompletionError::EmptyChoices)?;

    choice
        .message
        .content
        .ok_or_else(|| CompletionError::MalformedBody("choice has no message content".to_string()))
}

/// Extract the text delta from one streamed chunk, if it carries any
fn parse_chunk(data: &str) -> Result<Option<String>, CompletionError> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        CompletionError::MalformedBody(format!("{} (chunk: {})", e, truncate_for_error(data)))
    })?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Per-stream bookkeeping while turning SSE events into deltas
#[derive(Default)]
struct DeltaState {
    delivered: usize,
    finished: bool,
}

impl DeltaState {
    /// `None` ends the stream; `Some(None)` skips an event that carries no text
    fn accept<E: std::fmt::Display>(
        &mut self,
        event: Result<Event, EventStreamError<E>>,
    ) -> Option<Option<Result<String, CompletionError>>> {
        if self.finished {
            return None;
        }

        let item = match event {
            Ok(event) if event.data == "[DONE]" => return None,
            Ok(event) => parse_chunk(&event.data).transpose(),
            Err(e) => Some(Err(CompletionError::Stream {
                chunks_received: self.delivered,
                reason: e.to_string(),
            })),
        };

        match &item {
            Some(Ok(_)) => self.delivered += 1,
            Some(Err(_)) => self.finished = true,
            None => {}
        }
        Some(item)
    }
}

/// Turn a raw SSE byte stream into ordered text deltas
///
/// The stream ends at `[DONE]`, at end of body, or right after the first
/// error it yields.
fn delta_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, CompletionError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    bytes
        .eventsource()
        .scan(DeltaState::default(), |state, event| {
            future::ready(state.accept(event))
        })
        .filter_map(future::ready)
}

fn truncate_for_error(text: &str) -> String {
    const MAX_ERROR_BODY_CHARS: usize = 500;
    if text.chars().count() > MAX_ERROR_BODY_CHARS {
        let truncated: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}... [truncated]", truncated)
    } else {
        text.to_string()
    }
}
