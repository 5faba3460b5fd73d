//! Direct streaming endpoint
//!
//! Handles POST /stream/direct: a single model's deltas are relayed as they
//! arrive, with no candidates and no judge.

use crate::error::{AppError, AppResult, Stage};
use crate::handlers::{AppState, CallerQuery, EVENT_STREAM, StreamRequest, caller_tag};
use crate::metrics::{Endpoint, Outcome};
use crate::middleware::RequestId;
use crate::pipeline::normalize;
use axum::{
    Extension, Json,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::sync::Arc;

/// POST /stream/direct handler
///
/// Errors before the first delta map to an error status. Once streaming has
/// begun the status is already sent, so a mid-stream failure is logged,
/// counted, and the body is cut short.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<CallerQuery>,
    Json(request): Json<StreamRequest>,
) -> AppResult<Response> {
    let caller = caller_tag(&request, &query);
    let conversation = normalize(&request.prompt);
    let model = state.config().direct_model().to_string();

    tracing::info!(
        request_id = %request_id,
        caller = %caller,
        model = %model,
        turns = conversation.len(),
        "Received direct stream request"
    );

    if conversation.is_empty() {
        state
            .metrics()
            .record_request(Endpoint::Direct, Outcome::Failure);
        return Err(AppError::Validation(
            "prompt contains no turns with a known role and non-empty content".to_string(),
        ));
    }

    let sampling = state.config().streaming.direct_sampling();
    let deltas = match state
        .service()
        .stream(&model, &conversation, &sampling)
        .await
    {
        Ok(deltas) => deltas,
        Err(source) => {
            state
                .metrics()
                .record_request(Endpoint::Direct, Outcome::Failure);
            state.metrics().record_stage_failure(Stage::Stream);
            tracing::error!(
                request_id = %request_id,
                model = %model,
                error = %source,
                "Direct stream could not start"
            );
            return Err(AppError::StreamStart { model, source });
        }
    };

    state
        .metrics()
        .record_request(Endpoint::Direct, Outcome::Success);

    let metrics = Arc::clone(state.metrics());
    let body = deltas.map(move |delta| {
        if let Err(e) = &delta {
            metrics.record_stream_interruption();
            tracing::warn!(
                request_id = %request_id,
                model = %model,
                error = %e,
                "Direct stream interrupted after it started"
            );
        }
        delta
    });

    Ok((
        [
            (header::CONTENT_TYPE, EVENT_STREAM),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_state;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_relays_deltas_in_order() {
        let state = test_state("");
        let request: StreamRequest =
            serde_json::from_str(r#"{"prompt":[{"role":"user","content":"hello"}]}"#).unwrap();

        let response = handler(
            State(state.clone()),
            Extension(RequestId::new()),
            Query(CallerQuery::default()),
            Json(request),
        )
        .await
        .expect("direct stream should start");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Hello");
        assert_eq!(
            state
                .metrics()
                .requests_count(Endpoint::Direct, Outcome::Success),
            1
        );
    }

    #[tokio::test]
    async fn test_empty_prompt_is_rejected() {
        let state = test_state("");
        let request: StreamRequest = serde_json::from_str(r#"{"prompt":[]}"#).unwrap();

        let result = handler(
            State(state),
            Extension(RequestId::new()),
            Query(CallerQuery::default()),
            Json(request),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
