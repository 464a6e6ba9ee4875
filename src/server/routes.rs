//! HTTP route handlers for the resonance API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::resonance::{
    Channel, PipelineStep, ResonanceError, ResultRecord, SessionStats, UserId, UserState,
};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/respond", post(respond))
        .route("/api/damp", post(damp))
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Crate version.
    pub version: &'static str,
    /// Tracked sessions by state.
    pub sessions: SessionStats,
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "resonance-engine",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.engine.integrity().stats(),
    })
}

/// Respond request.
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    /// Query text.
    pub query: String,
    /// Owning user.
    pub user_id: String,
}

/// Respond response.
#[derive(Debug, Serialize)]
pub struct RespondResponse {
    /// Channel the query was routed to.
    pub channel: Channel,
    /// Ranked results.
    pub results: Vec<ResultRecord>,
    /// Number of results.
    pub count: usize,
}

/// Handle respond requests.
async fn respond(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    let user_id = UserId::new(&request.user_id)
        .map_err(|err| ResonanceError::InvalidUserId(err.to_string()))?;

    let channel = state.engine.router().route(&request.query);
    let results = state.engine.respond(&request.query, &user_id).await?;
    let count = results.len();

    Ok(Json(RespondResponse {
        channel,
        results,
        count,
    }))
}

/// Damping request.
#[derive(Debug, Deserialize)]
pub struct DampRequest {
    /// Signals to damp.
    pub state: UserState,
}

/// Damping response.
#[derive(Debug, Serialize)]
pub struct DampResponse {
    /// Damped signals (same keys as the input).
    pub state: UserState,
    /// Factor applied.
    pub factor: f64,
}

/// Handle damping requests.
async fn damp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DampRequest>,
) -> Json<DampResponse> {
    let damping = state.engine.damping();
    Json(DampResponse {
        state: damping.apply(&request.state),
        factor: damping.factor(),
    })
}

/// Error body returned by every route.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<&'static str>,
    retryable: bool,
}

/// Engine error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(ResonanceError);

impl From<ResonanceError> for ApiError {
    fn from(err: ResonanceError) -> Self {
        Self(err)
    }
}

fn status_for(err: &ResonanceError) -> StatusCode {
    match err {
        ResonanceError::Backend { .. } => StatusCode::BAD_GATEWAY,
        ResonanceError::InvalidSessionState { .. } => StatusCode::CONFLICT,
        ResonanceError::Config(_) | ResonanceError::InvalidUserId(_) => StatusCode::BAD_REQUEST,
        ResonanceError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        ResonanceError::RollbackFailed { original, .. } => status_for(original),
        ResonanceError::AtStep { source, .. } => status_for(source),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::warn!(error = %self.0, %status, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            step: self.0.step().map(PipelineStep::as_str),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use tower::ServiceExt;

    use super::*;
    use crate::resonance::{
        BackendError, EngineBackends, FixedResults, NoopStore, Query, ResonanceConfig,
        ResonanceEngine, SearchBackend, SearchFuture, SessionId, SessionState, ZeroEmbedder,
    };

    struct DownBackend;

    impl SearchBackend for DownBackend {
        fn search<'a>(
            &'a self,
            _query: &'a Query,
        ) -> SearchFuture<'a, Result<Vec<ResultRecord>, BackendError>> {
            Box::pin(async { Err(BackendError::Timeout(Duration::from_millis(5))) })
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn router_with(lexical: Arc<dyn SearchBackend>) -> Router {
        let mut config = ResonanceConfig::default();
        config.embedding.ndims = 4;
        let engine = ResonanceEngine::new(
            config,
            EngineBackends {
                lexical,
                vector: Arc::new(FixedResults::vector_demo().unwrap()),
                embedder: Arc::new(ZeroEmbedder::new(4)),
                store: Arc::new(NoopStore),
                scorer: None,
            },
        )
        .unwrap();
        create_router(Arc::new(AppState::new(Arc::new(engine))))
    }

    fn demo_router() -> Router {
        router_with(Arc::new(FixedResults::lexical_demo().unwrap()))
    }

    fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_sessions() {
        let response = demo_router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"]["active"], 0);
    }

    #[tokio::test]
    async fn test_respond_returns_ranked_results() {
        let request = post_json(
            "/api/respond",
            &serde_json::json!({"query": "define resonance", "user_id": "seema@threshold"}),
        );
        let response = demo_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["channel"], "lexical");
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["document"], "Lexical match result");
    }

    #[tokio::test]
    async fn test_respond_rejects_blank_user() {
        let request = post_json(
            "/api/respond",
            &serde_json::json!({"query": "hi", "user_id": "   "}),
        );
        let response = demo_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_backend_failure_maps_to_bad_gateway() {
        let request = post_json(
            "/api/respond",
            &serde_json::json!({"query": "hi", "user_id": "u"}),
        );
        let response = router_with(Arc::new(DownBackend))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["step"], "search");
        assert_eq!(body["retryable"], true);
    }

    #[test]
    fn test_step_attributed_errors_keep_their_status() {
        let err = ResonanceError::InvalidSessionState {
            session_id: SessionId::new(),
            state: Some(SessionState::Committed),
        }
        .at_step(PipelineStep::Store);
        assert_eq!(status_for(&err), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_damp_scales_every_signal() {
        let request = post_json(
            "/api/damp",
            &serde_json::json!({"state": {"curiosity": 1.0, "fatigue": -2.0}}),
        );
        let response = demo_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let curiosity = body["state"]["curiosity"].as_f64().unwrap();
        let fatigue = body["state"]["fatigue"].as_f64().unwrap();
        assert!((curiosity - 0.9).abs() < 1e-9);
        assert!((fatigue + 1.8).abs() < 1e-9);
    }
}
