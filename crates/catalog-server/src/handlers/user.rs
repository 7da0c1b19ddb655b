use axum::{extract::State, Json};
use crate::{auth::Identity, error::ApiResult, models::{DownloadWithApp, Feedback, ReportWithApp, UserStats}, AppState};
use super::resolve_apps;

#[utoipa::path(get, path = "/api/user/stats", security(("bearer_auth" = [])), responses( (status = 200, body = UserStats), (status = 401, body = crate::error::ApiErrorBody) ))]
#[tracing::instrument(skip(state), fields(subject=%identity.subject))]
pub async fn stats(State(state): State<AppState>, identity: Identity) -> ApiResult<Json<UserStats>> {
    Ok(Json(state.store.get_user_stats(&identity.subject).await?))
}

/// Download history, newest first. `app` is null for apps deleted since.
#[utoipa::path(get, path = "/api/user/downloads", security(("bearer_auth" = [])), responses( (status = 200, body = [DownloadWithApp]), (status = 401, body = crate::error::ApiErrorBody) ))]
#[tracing::instrument(skip(state), fields(subject=%identity.subject))]
pub async fn downloads(State(state): State<AppState>, identity: Identity) -> ApiResult<Json<Vec<DownloadWithApp>>> {
    let rows = state.store.get_user_downloads(&identity.subject).await?;
    let apps = resolve_apps(&*state.store, rows.iter().map(|d| d.app_id)).await?;
    let joined = rows.into_iter()
        .map(|download| { let app = apps.get(&download.app_id).cloned(); DownloadWithApp { download, app } })
        .collect();
    Ok(Json(joined))
}

#[utoipa::path(get, path = "/api/user/feedback", security(("bearer_auth" = [])), responses( (status = 200, body = [Feedback]), (status = 401, body = crate::error::ApiErrorBody) ))]
#[tracing::instrument(skip(state), fields(subject=%identity.subject))]
pub async fn feedback(State(state): State<AppState>, identity: Identity) -> ApiResult<Json<Vec<Feedback>>> {
    Ok(Json(state.store.get_user_feedback(&identity.subject).await?))
}

#[utoipa::path(get, path = "/api/user/reports", security(("bearer_auth" = [])), responses( (status = 200, body = [ReportWithApp]), (status = 401, body = crate::error::ApiErrorBody) ))]
#[tracing::instrument(skip(state), fields(subject=%identity.subject))]
pub async fn reports(State(state): State<AppState>, identity: Identity) -> ApiResult<Json<Vec<ReportWithApp>>> {
    let rows = state.store.get_user_reports(&identity.subject).await?;
    let apps = resolve_apps(&*state.store, rows.iter().filter_map(|r| r.app_id)).await?;
    let joined = rows.into_iter()
        .map(|report| { let app = report.app_id.and_then(|id| apps.get(&id).cloned()); ReportWithApp { report, app } })
        .collect();
    Ok(Json(joined))
}
