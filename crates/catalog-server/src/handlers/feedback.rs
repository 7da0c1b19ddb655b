use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;
use crate::{auth::Identity, error::ApiResult, models::{Feedback, NewFeedback}, AppState};
use super::ValidJson;

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateFeedbackRequest {
    #[validate(length(min = 1, max = 255, message = "subject is required (max 255 characters)"))]
    pub subject: String,
    #[validate(length(min = 1, message = "message is required"))]
    pub message: String,
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: Option<i32>,
}

#[utoipa::path(post, path = "/api/feedback", request_body = CreateFeedbackRequest, security(("bearer_auth" = [])), responses(
    (status = 201, body = Feedback),
    (status = 400, body = crate::error::ApiErrorBody),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 409, body = crate::error::ApiErrorBody, description = "Caller has not logged in")
))]
#[tracing::instrument(skip(state, req), fields(subject=%identity.subject))]
pub async fn create_feedback(State(state): State<AppState>, identity: Identity, ValidJson(req): ValidJson<CreateFeedbackRequest>) -> ApiResult<(StatusCode, Json<Feedback>)> {
    let created = state.store.create_feedback(NewFeedback {
        user_id: identity.subject,
        subject: req.subject.trim().to_string(),
        message: req.message,
        rating: req.rating,
    }).await?;
    info!(feedback_id=%created.id, rating=?created.rating, "feedback_created");
    Ok((StatusCode::CREATED, Json(created)))
}
