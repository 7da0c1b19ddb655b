use axum::{body::Body, extract::{Path, State}, http::{header, StatusCode}, response::Response, Json};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use crate::{auth::Identity, error::{ApiError, ApiResult}, models::{App, NewDownload}, telemetry::{DOWNLOADS_RECORDED, PACKAGE_DOWNLOADS_STREAMED}, AppState};
use super::parse_app_id;

/// Active catalog, newest first.
#[utoipa::path(get, path = "/api/apps", responses( (status = 200, body = [App]) ))]
#[tracing::instrument(level = "debug", skip(state))]
pub async fn list_apps(State(state): State<AppState>) -> ApiResult<Json<Vec<App>>> {
    Ok(Json(state.store.get_active_apps().await?))
}

/// Single app, active or not.
#[utoipa::path(get, path = "/api/apps/{id}", params( ("id" = String, Path, description = "App id") ), responses(
    (status = 200, body = App),
    (status = 404, body = crate::error::ApiErrorBody)
))]
#[tracing::instrument(level = "debug", skip(state))]
pub async fn get_app(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<App>> {
    let app_id = parse_app_id(&id)?;
    state.store.get_app(app_id).await?.map(Json).ok_or_else(|| ApiError::not_found("app not found"))
}

/// `attachment; filename="<name>.zip"` with characters that cannot sit in a quoted header value replaced.
/// When anything was replaced, the exact name follows as an RFC 5987 `filename*`.
pub(crate) fn attachment_disposition(app_name: &str) -> String {
    let mut replaced = false;
    let safe: String = app_name.chars()
        .map(|c| if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' { c } else { replaced = true; '_' })
        .collect();
    let mut value = format!("attachment; filename=\"{}.zip\"", safe.trim());
    if replaced {
        value.push_str(&format!("; filename*=UTF-8''{}.zip", urlencoding::encode(app_name.trim())));
    }
    value
}

/// Stream the package. When downloads require auth the download is also
/// recorded before the first byte goes out.
#[utoipa::path(get, path = "/api/apps/{id}/download", params( ("id" = String, Path, description = "App id") ), responses(
    (status = 200, description = "ZIP package", content_type = "application/zip"),
    (status = 401, body = crate::error::ApiErrorBody, description = "Authentication required in recorded-download mode"),
    (status = 404, body = crate::error::ApiErrorBody, description = "Unknown app or package file missing")
))]
#[tracing::instrument(skip(state, identity))]
pub async fn download_app(State(state): State<AppState>, Path(id): Path<String>, identity: Option<Identity>) -> ApiResult<Response> {
    let caller = if state.download_requires_auth {
        Some(identity.ok_or_else(|| ApiError::unauthorized("authentication required"))?)
    } else { None };
    let app_id = parse_app_id(&id)?;
    let app = state.store.get_app(app_id).await?.ok_or_else(|| ApiError::not_found("app not found"))?;
    let Some(package) = state.packages.open(&app.file_name).await? else {
        warn!(app_id=%app.id, file_name=%app.file_name, "package_file_missing");
        return Err(ApiError::not_found("package file not found"));
    };
    if let Some(caller) = caller {
        let download = state.store.record_download(NewDownload { user_id: caller.subject, app_id }).await?;
        DOWNLOADS_RECORDED.inc();
        info!(download_id=%download.id, user_id=%download.user_id, "download_recorded");
    }
    PACKAGE_DOWNLOADS_STREAMED.inc();
    info!(app_id=%app.id, size=package.size, "package_stream_start");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, package.size)
        .header(header::CONTENT_DISPOSITION, attachment_disposition(&app.name))
        .body(Body::from_stream(ReaderStream::new(package.file)))
        .map_err(|e| ApiError::internal(format!("response build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::attachment_disposition;

    #[test]
    fn disposition_quotes_are_neutralized() {
        assert_eq!(attachment_disposition("My Tool"), "attachment; filename=\"My Tool.zip\"");
        assert_eq!(attachment_disposition("a\"b\\c"), "attachment; filename=\"a_b_c.zip\"; filename*=UTF-8''a%22b%5Cc.zip");
    }

    #[test]
    fn non_ascii_names_keep_an_exact_encoded_form() {
        assert_eq!(attachment_disposition("Café"), "attachment; filename=\"Caf_.zip\"; filename*=UTF-8''Caf%C3%A9.zip");
        assert_eq!(attachment_disposition("Outil réseau"), "attachment; filename=\"Outil r_seau.zip\"; filename*=UTF-8''Outil%20r%C3%A9seau.zip");
    }
}
