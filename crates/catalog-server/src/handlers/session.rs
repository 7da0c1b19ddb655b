use axum::{body::Bytes, extract::State, Json};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;
use crate::{auth::Identity, error::{ApiError, ApiResult}, models::{UpsertUser, User}, AppState};

/// Optional profile claims. Omitted fields keep their stored value.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 255))]
    pub first_name: Option<String>,
    #[validate(length(max = 255))]
    pub last_name: Option<String>,
    #[validate(url(message = "must be a valid URL"))]
    pub profile_image_url: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> { v.filter(|s| !s.trim().is_empty()) }

/// Register or refresh the caller's user record.
#[utoipa::path(post, path = "/api/login", request_body = LoginRequest, security(("bearer_auth" = [])), responses(
    (status = 200, body = User),
    (status = 400, body = crate::error::ApiErrorBody),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 409, body = crate::error::ApiErrorBody, description = "Email already used by another user")
))]
#[tracing::instrument(skip(state, body), fields(subject=%identity.subject))]
pub async fn login(State(state): State<AppState>, identity: Identity, body: Bytes) -> ApiResult<Json<User>> {
    let req: LoginRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LoginRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(format!("invalid login body: {e}")))?
    };
    req.validate()?;
    let existing = state.store.get_user(&identity.subject).await?;
    let keep = |claim: Option<String>, stored: fn(&User) -> Option<String>| non_blank(claim).or_else(|| existing.as_ref().and_then(stored));
    let upsert = UpsertUser {
        id: identity.subject.clone(),
        email: keep(req.email, |u| u.email.clone()),
        first_name: keep(req.first_name, |u| u.first_name.clone()),
        last_name: keep(req.last_name, |u| u.last_name.clone()),
        profile_image_url: keep(req.profile_image_url, |u| u.profile_image_url.clone()),
        is_admin: identity.is_admin(),
    };
    let user = state.store.upsert_user(upsert).await?;
    info!(user_id=%user.id, first_login=existing.is_none(), "user_login");
    Ok(Json(user))
}

/// The caller's user record.
#[utoipa::path(get, path = "/api/auth/user", security(("bearer_auth" = [])), responses(
    (status = 200, body = User),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 404, body = crate::error::ApiErrorBody, description = "Identity has not logged in yet")
))]
#[tracing::instrument(skip(state), fields(subject=%identity.subject))]
pub async fn current_user(State(state): State<AppState>, identity: Identity) -> ApiResult<Json<User>> {
    match state.store.get_user(&identity.subject).await? {
        Some(user) => Ok(Json(user)),
        None => Err(ApiError::not_found("user not registered")),
    }
}
