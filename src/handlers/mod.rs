//! HTTP request handlers

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::models::CompletionService;
use crate::pipeline::{Arbiter, RawTurn};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod direct;
pub mod health;
pub mod metrics;
pub mod stream;

/// Content type of streamed answers
pub const EVENT_STREAM: &str = "text/event-stream";

/// Body accepted by both streaming endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub prompt: Vec<RawTurn>,
    /// Caller identity tag, logged only
    #[serde(default)]
    pub email: Option<String>,
}

/// `?email=` may be given instead of the body field
#[derive(Debug, Default, Deserialize)]
pub struct CallerQuery {
    pub email: Option<String>,
}

/// Pick the caller tag for logging; the body field wins over the query string
pub(crate) fn caller_tag<'a>(request: &'a StreamRequest, query: &'a CallerQuery) -> &'a str {
    request
        .email
        .as_deref()
        .or(query.email.as_deref())
        .unwrap_or("anonymous")
}

/// Application state shared across all handlers
///
/// Everything is immutable after construction and Arc'd for cheap cloning
/// across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    service: Arc<dyn CompletionService>,
    arbiter: Arc<Arbiter>,
    metrics: Arc<Metrics>,
}

impl AppState {
    /// Build state from configuration and the completion backend
    pub fn new(config: Arc<Config>, service: Arc<dyn CompletionService>) -> AppResult<Self> {
        let metrics = Arc::new(
            Metrics::new()
                .map_err(|e| AppError::Internal(format!("Failed to register metrics: {}", e)))?,
        );
        let arbiter = Arc::new(Arbiter::new(
            &config,
            Arc::clone(&service),
            Arc::clone(&metrics),
        )?);

        Ok(Self {
            config,
            service,
            arbiter,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &Arc<dyn CompletionService> {
        &self.service
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.arbiter
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

/// Full application router with middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream/", post(stream::handler))
        .route("/stream/direct", post(direct::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(crate::middleware::request_id_middleware))
}
