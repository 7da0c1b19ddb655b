//! Catalog management: listing, package upload, metadata edits, deletion.
use axum::{extract::{multipart::{Field, MultipartError}, Multipart, Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use validator::Validate;
use crate::{
    error::{ApiError, ApiResult},
    models::{App, AppPatch, NewApp, SUGGESTED_CATEGORIES},
    packages::PendingUpload,
    telemetry::{PACKAGE_UPLOADS_REJECTED, PACKAGE_UPLOAD_BYTES},
    AppState,
};
use super::{parse_app_id, ValidJson};

/// Extra body allowance on the upload route for multipart framing and metadata fields.
pub const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Default, Validate)]
struct UploadMetadata {
    #[validate(length(min = 1, max = 255, message = "name is required (max 255 characters)"))]
    name: String,
    #[validate(length(min = 1, message = "description is required"))]
    description: String,
    #[validate(length(min = 1, max = 100, message = "category is required (max 100 characters)"))]
    category: String,
    #[validate(length(max = 50, message = "version is limited to 50 characters"))]
    version: Option<String>,
    #[validate(url(message = "iconUrl must be a valid URL"), length(max = 500, message = "iconUrl is limited to 500 characters"))]
    icon_url: Option<String>,
}

/// Multipart form accepted by the upload endpoint. Documentation only; the
/// handler reads the parts as they stream in.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadAppForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    name: String,
    description: String,
    category: String,
    version: Option<String>,
    #[schema(rename = "iconUrl")]
    icon_url: Option<String>,
}

fn optional(raw: String) -> Option<String> {
    let t = raw.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(StatusCode::BAD_REQUEST, "size_exceeded", "upload exceeds the configured size limit")
    } else {
        ApiError::bad_request(e.body_text())
    }
}

fn rejected(err: impl Into<ApiError>) -> ApiError {
    let err = err.into();
    if err.status == StatusCode::BAD_REQUEST { PACKAGE_UPLOADS_REJECTED.with_label_values(&[err.code]).inc(); }
    err
}

async fn field_text(field: Field<'_>) -> ApiResult<String> {
    field.text().await.map_err(multipart_error)
}

/// Whole catalog including inactive apps.
#[utoipa::path(get, path = "/api/admin/apps", security(("bearer_auth" = [])), responses(
    (status = 200, body = [App]),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 403, body = crate::error::ApiErrorBody)
))]
#[tracing::instrument(level = "debug", skip(state))]
pub async fn list_all_apps(State(state): State<AppState>) -> ApiResult<Json<Vec<App>>> {
    Ok(Json(state.store.get_all_apps().await?))
}

/// Upload a ZIP package together with its catalog metadata.
#[utoipa::path(post, path = "/api/admin/apps", request_body(content = UploadAppForm, content_type = "multipart/form-data"), security(("bearer_auth" = [])), responses(
    (status = 201, body = App),
    (status = 400, body = crate::error::ApiErrorBody, description = "Not a ZIP, too large, or invalid metadata"),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 403, body = crate::error::ApiErrorBody)
))]
#[tracing::instrument(level = "info", skip(state, multipart))]
pub async fn upload_app(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<(StatusCode, Json<App>)> {
    let mut meta = UploadMetadata::default();
    let mut pending: Option<PendingUpload> = None;
    while let Some(mut field) = multipart.next_field().await.map_err(|e| rejected(multipart_error(e)))? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                if pending.is_some() { return Err(rejected(ApiError::bad_request("only one file part is accepted"))); }
                let original = field.file_name().unwrap_or_default().to_string();
                let mut upload = state.packages.begin(&original).await.map_err(rejected)?;
                while let Some(chunk) = field.chunk().await.map_err(|e| rejected(multipart_error(e)))? {
                    upload.write_chunk(&chunk).await.map_err(rejected)?;
                }
                debug!(original=%original, bytes=upload.written(), "package_received");
                pending = Some(upload);
            }
            "name" => meta.name = field_text(field).await?.trim().to_string(),
            "description" => meta.description = field_text(field).await?.trim().to_string(),
            "category" => meta.category = field_text(field).await?.trim().to_string(),
            "version" => meta.version = optional(field_text(field).await?),
            "iconUrl" => meta.icon_url = optional(field_text(field).await?),
            other => debug!(field=%other, "upload_field_ignored"),
        }
    }
    let Some(upload) = pending else { return Err(rejected(ApiError::bad_request("file is required"))) };
    meta.validate().map_err(rejected)?;
    if !SUGGESTED_CATEGORIES.contains(&meta.category.as_str()) { debug!(category=%meta.category, "category_not_suggested"); }
    let stored = upload.finish().await.map_err(rejected)?;
    let new_app = NewApp {
        name: meta.name,
        description: meta.description,
        category: meta.category,
        version: meta.version,
        icon_url: meta.icon_url,
        file_name: stored.file_name.clone(),
        file_size: i64::try_from(stored.size).ok(),
        is_active: None,
    };
    let created = match state.store.create_app(new_app).await {
        Ok(app) => app,
        Err(e) => {
            if let Err(rm) = state.packages.remove(&stored.file_name).await { warn!(error=%rm, file_name=%stored.file_name, "orphan_package_cleanup_failed"); }
            return Err(e.into());
        }
    };
    PACKAGE_UPLOAD_BYTES.inc_by(stored.size);
    info!(app_id=%created.id, file_name=%created.file_name, size=stored.size, "app_created");
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateAppRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    /// `null` clears the stored version.
    #[serde(with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    #[validate(length(max = 50))]
    pub version: Option<Option<String>>,
    /// `null` clears the stored icon.
    #[serde(with = "::serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    #[validate(url, length(max = 500))]
    pub icon_url: Option<Option<String>>,
    pub is_active: Option<bool>,
}

impl From<UpdateAppRequest> for AppPatch {
    fn from(r: UpdateAppRequest) -> Self {
        AppPatch { name: r.name, description: r.description, category: r.category, version: r.version, icon_url: r.icon_url, is_active: r.is_active }
    }
}

/// Partial metadata update, e.g. `{"isActive": false}` to hide an app.
#[utoipa::path(patch, path = "/api/admin/apps/{id}", params( ("id" = String, Path, description = "App id") ), request_body = UpdateAppRequest, security(("bearer_auth" = [])), responses(
    (status = 200, body = App),
    (status = 400, body = crate::error::ApiErrorBody),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 403, body = crate::error::ApiErrorBody),
    (status = 404, body = crate::error::ApiErrorBody)
))]
#[tracing::instrument(level = "info", skip(state, req))]
pub async fn update_app(State(state): State<AppState>, Path(id): Path<String>, ValidJson(req): ValidJson<UpdateAppRequest>) -> ApiResult<Json<App>> {
    let app_id = parse_app_id(&id)?;
    let updated = state.store.update_app(app_id, req.into()).await?.ok_or_else(|| ApiError::not_found("app not found"))?;
    info!(app_id=%updated.id, active=updated.is_active, "app_updated");
    Ok(Json(updated))
}

/// Hard delete. Download and report history keeps pointing at the removed id.
#[utoipa::path(delete, path = "/api/admin/apps/{id}", params( ("id" = String, Path, description = "App id") ), security(("bearer_auth" = [])), responses(
    (status = 204, description = "Deleted"),
    (status = 401, body = crate::error::ApiErrorBody),
    (status = 403, body = crate::error::ApiErrorBody),
    (status = 404, body = crate::error::ApiErrorBody)
))]
#[tracing::instrument(level = "info", skip(state))]
pub async fn delete_app(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    let app_id = parse_app_id(&id)?;
    let app = state.store.get_app(app_id).await?.ok_or_else(|| ApiError::not_found("app not found"))?;
    state.store.delete_app(app_id).await?;
    if let Err(e) = state.packages.remove(&app.file_name).await {
        warn!(error=%e, file_name=%app.file_name, "package_remove_failed");
    }
    info!(app_id=%app_id, "app_deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_optional_fields_are_absent() {
        assert_eq!(optional("  ".into()), None);
        assert_eq!(optional(" 1.2 ".into()), Some("1.2".to_string()));
    }

    #[test]
    fn upload_metadata_rules() {
        let ok = UploadMetadata { name: "Tool".into(), description: "d".into(), category: "utilities".into(), version: None, icon_url: None };
        assert!(ok.validate().is_ok());
        let bad = UploadMetadata { name: String::new(), description: String::new(), category: "x".repeat(101), version: Some("v".repeat(51)), icon_url: Some("not a url".into()) };
        let err: ApiError = bad.validate().unwrap_err().into();
        let fields = err.fields.unwrap();
        for key in ["name", "description", "category", "version", "icon_url"] { assert!(fields.contains_key(key), "{key}"); }
    }
}
