//! HTTP trigger surface: health, on-demand digest runs, expiration checks.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::digest::{DigestOrchestrator, DigestReport};
use crate::errors::AppError;
use crate::models::ExpirationStatus;
use crate::store::KvStore;

/// Shared state for handlers.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn KvStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/digest", get(trigger_digest).post(trigger_digest))
        .route("/api/expiration", post(check_expiration))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
}

/// 200 with the run report, even when accounts failed. 500 only when the
/// run could not start for lack of configuration.
async fn trigger_digest(State(state): State<Arc<AppState>>) -> Response {
    let started = Instant::now();
    match DigestOrchestrator::from_config(&state.config, state.store.clone()) {
        Ok(orchestrator) => {
            let report = orchestrator.run().await;
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "digest run refused");
            let report = DigestReport::aborted(&e.to_string(), started);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(report)).into_response()
        }
    }
}

/// Re-validate every credential, post the consolidated warning, and return
/// the statuses that needed one.
async fn check_expiration(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ExpirationStatus>>, AppError> {
    let orchestrator = DigestOrchestrator::from_config(&state.config, state.store.clone())?;
    let monitor = orchestrator.monitor();

    let statuses = monitor.check_all_credentials().await?;
    if let Err(e) = monitor.post_consolidated_warnings(&statuses).await {
        tracing::warn!(error = %e, "expiration warning delivery failed");
    }
    Ok(Json(statuses))
}

/// Tags every response with an `x-request-id` for log correlation.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}
