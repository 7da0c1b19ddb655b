use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct ReadinessResponse { pub status: &'static str }

/// Readiness probe: store connectivity plus a writable package directory.
#[utoipa::path(get, path = "/readyz", responses(
    (status = 200, body = ReadinessResponse, description = "Service ready"),
    (status = 503, body = ReadinessResponse, description = "Dependency not ready")
))]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    if let Err(e) = state.store.ping().await {
        tracing::warn!(error=%e, "readiness_store_unavailable");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(ReadinessResponse { status: "degraded" }));
    }
    if !tokio::fs::metadata(state.packages.dir()).await.map(|m| m.is_dir()).unwrap_or(false) {
        tracing::warn!(dir=?state.packages.dir(), "readiness_package_dir_missing");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(ReadinessResponse { status: "degraded" }));
    }
    (StatusCode::OK, Json(ReadinessResponse { status: "ready" }))
}
