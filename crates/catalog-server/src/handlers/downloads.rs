use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;
use crate::{auth::Identity, error::{ApiError, ApiResult}, models::{Download, NewDownload}, telemetry::DOWNLOADS_RECORDED, AppState};
use super::ValidJson;

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordDownloadRequest {
    #[validate(required(message = "appId is required"))]
    pub app_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecordDownloadResponse { pub success: bool, pub download: Download }

/// Log a download and bump the app's counter in one step.
#[utoipa::path(post, path = "/api/downloads", request_body = RecordDownloadRequest, security(("bearer_auth" = [])), responses(
    (status = 200, body = RecordDownloadResponse),
    (status = 400, body = crate::error::ApiErrorBody),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 404, body = crate::error::ApiErrorBody, description = "Unknown app"),
    (status = 409, body = crate::error::ApiErrorBody, description = "Caller has not logged in")
))]
#[tracing::instrument(skip(state, req), fields(subject=%identity.subject, app_id=?req.app_id))]
pub async fn record_download(State(state): State<AppState>, identity: Identity, ValidJson(req): ValidJson<RecordDownloadRequest>) -> ApiResult<Json<RecordDownloadResponse>> {
    let app_id = req.app_id.ok_or_else(|| ApiError::bad_request("appId is required"))?;
    let download = state.store.record_download(NewDownload { user_id: identity.subject, app_id }).await?;
    DOWNLOADS_RECORDED.inc();
    info!(download_id=%download.id, "download_recorded");
    Ok(Json(RecordDownloadResponse { success: true, download }))
}
