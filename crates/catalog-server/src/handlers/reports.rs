use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;
use crate::{auth::Identity, error::{ApiError, ApiResult}, models::{NewReport, Report, SUGGESTED_ISSUE_TYPES}, AppState};
use super::ValidJson;

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateReportRequest {
    /// Optional; when present the app must exist.
    pub app_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "issueType is required (max 100 characters)"))]
    pub issue_type: String,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
}

#[utoipa::path(post, path = "/api/reports", request_body = CreateReportRequest, security(("bearer_auth" = [])), responses(
    (status = 201, body = Report),
    (status = 400, body = crate::error::ApiErrorBody),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 404, body = crate::error::ApiErrorBody, description = "Referenced app does not exist"),
    (status = 409, body = crate::error::ApiErrorBody, description = "Caller has not logged in")
))]
#[tracing::instrument(skip(state, req), fields(subject=%identity.subject))]
pub async fn create_report(State(state): State<AppState>, identity: Identity, ValidJson(req): ValidJson<CreateReportRequest>) -> ApiResult<(StatusCode, Json<Report>)> {
    if let Some(app_id) = req.app_id {
        if state.store.get_app(app_id).await?.is_none() { return Err(ApiError::not_found("app not found")); }
    }
    if !SUGGESTED_ISSUE_TYPES.contains(&req.issue_type.trim()) { debug!(issue_type=%req.issue_type, "issue_type_not_suggested"); }
    let created = state.store.create_report(NewReport {
        user_id: identity.subject,
        app_id: req.app_id,
        issue_type: req.issue_type.trim().to_string(),
        description: req.description,
    }).await?;
    info!(report_id=%created.id, app_id=?created.app_id, issue_type=%created.issue_type, "report_created");
    Ok((StatusCode::CREATED, Json(created)))
}
