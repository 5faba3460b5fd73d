//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Number of configured candidate models
    pub candidates: usize,
    /// Model that arbitrates between candidates
    pub judge_model: String,
}

/// Health check handler
///
/// Always 200 OK. Upstream reachability is not probed; the body reports the
/// configured arbitration topology.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let arbiter = state.arbiter();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            candidates: arbiter.candidate_count(),
            judge_model: arbiter.judge_model().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::test_state;

    #[tokio::test]
    async fn test_health_handler_reports_topology() {
        let (status, Json(body)) = handler(State(test_state(""))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "OK");
        assert_eq!(body.candidates, 2);
        assert_eq!(body.judge_model, "judge");
    }
}
