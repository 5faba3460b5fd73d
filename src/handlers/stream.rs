//! Arbitrated streaming endpoint
//!
//! Handles POST /stream/: every candidate answers, the judge picks or merges,
//! and the judge's result is streamed back in chunks.

use crate::error::{AppError, AppResult};
use crate::handlers::{AppState, CallerQuery, EVENT_STREAM, StreamRequest, caller_tag};
use crate::metrics::{Endpoint, Outcome};
use crate::middleware::RequestId;
use crate::pipeline::{chunk_stream, normalize};
use axum::{
    Extension, Json,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::convert::Infallible;

/// POST /stream/ handler
///
/// The response only starts once the judge's `<result>` has been extracted, so
/// any pipeline failure surfaces as an error status rather than a truncated
/// stream.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<CallerQuery>,
    Json(request): Json<StreamRequest>,
) -> AppResult<Response> {
    let caller = caller_tag(&request, &query);
    let conversation = normalize(&request.prompt);

    tracing::info!(
        request_id = %request_id,
        caller = %caller,
        raw_turns = request.prompt.len(),
        turns = conversation.len(),
        "Received arbitrated stream request"
    );

    if conversation.is_empty() {
        state
            .metrics()
            .record_request(Endpoint::Arbitrated, Outcome::Failure);
        return Err(AppError::Validation(
            "prompt contains no turns with a known role and non-empty content".to_string(),
        ));
    }

    let verdict = match state.arbiter().arbitrate(&conversation, request_id).await {
        Ok(verdict) => verdict,
        Err(e) => {
            state
                .metrics()
                .record_request(Endpoint::Arbitrated, Outcome::Failure);
            tracing::error!(
                request_id = %request_id,
                caller = %caller,
                stage = ?e.stage(),
                error = %e,
                "Arbitration failed"
            );
            return Err(e);
        }
    };

    state
        .metrics()
        .record_request(Endpoint::Arbitrated, Outcome::Success);

    let granularity = state.config().streaming.granularity;
    let chunks = chunk_stream(verdict.result, granularity).map(Ok::<_, Infallible>);

    Ok((
        [
            (header::CONTENT_TYPE, EVENT_STREAM),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(chunks),
    )
        .into_response())
}
