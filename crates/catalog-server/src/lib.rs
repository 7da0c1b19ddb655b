pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod packages;
pub mod store;
pub mod telemetry;
pub mod test_support;

use axum::{extract::DefaultBodyLimit, middleware, response::Html, routing::{get, patch, post}, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use auth::{auth_layer, require_admin_mw, require_user_mw, TokenRegistry};
use handlers::{admin, apps, downloads, feedback, health::health, readiness::readiness, reports, session, user};
use packages::PackageStore;
use store::SharedStore;
use telemetry::{metrics_handler, track_metrics};

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub packages: Arc<PackageStore>,
    pub tokens: Arc<TokenRegistry>,
    /// Merge download recording into the file download and require a user for it.
    pub download_requires_auth: bool,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::readiness::readiness,
        handlers::session::login,
        handlers::session::current_user,
        handlers::user::stats,
        handlers::user::downloads,
        handlers::user::feedback,
        handlers::user::reports,
        handlers::apps::list_apps,
        handlers::apps::get_app,
        handlers::apps::download_app,
        handlers::downloads::record_download,
        handlers::feedback::create_feedback,
        handlers::reports::create_report,
        handlers::admin::list_all_apps,
        handlers::admin::upload_app,
        handlers::admin::update_app,
        handlers::admin::delete_app,
    ),
    components(schemas(
        error::ApiErrorBody,
        models::User, models::App, models::Feedback, models::Report, models::Download,
        models::UserStats, models::DownloadWithApp, models::ReportWithApp,
        handlers::health::HealthResponse,
        handlers::readiness::ReadinessResponse,
        handlers::session::LoginRequest,
        handlers::downloads::RecordDownloadRequest,
        handlers::downloads::RecordDownloadResponse,
        handlers::feedback::CreateFeedbackRequest,
        handlers::reports::CreateReportRequest,
        handlers::admin::UploadAppForm,
        handlers::admin::UpdateAppRequest,
    )),
    tags( (name = "catalog", description = "Package catalog API") )
)]
pub struct ApiDoc;

async fn swagger_ui() -> Html<&'static str> {
    Html(r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"/><title>Catalog API Docs</title>
<link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
window.onload = () => { SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' }); };
</script>
</body></html>"#)
}

/// OpenAPI document with the bearer scheme the `security(...)` annotations refer to.
pub fn openapi_document() -> serde_json::Value {
    let mut value = serde_json::to_value(ApiDoc::openapi()).unwrap_or_else(|e| {
        tracing::error!(error=%e, "openapi_serialize_failed");
        serde_json::json!({})
    });
    value["components"]["securitySchemes"]["bearer_auth"] = serde_json::json!({"type": "http", "scheme": "bearer"});
    value
}

pub fn build_router(state: AppState) -> Router {
    let openapi = openapi_document();
    let upload_limit = state.packages.max_bytes().saturating_add(admin::MULTIPART_OVERHEAD_BYTES);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);

    let public = Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readiness))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(|| async move { axum::Json(openapi) }))
        .route("/swagger", get(swagger_ui))
        .route("/api/apps", get(apps::list_apps))
        .route("/api/apps/:id", get(apps::get_app))
        .route("/api/apps/:id/download", get(apps::download_app));

    let signed_in = Router::new()
        .route("/api/login", post(session::login))
        .route("/api/auth/user", get(session::current_user))
        .route("/api/user/stats", get(user::stats))
        .route("/api/user/downloads", get(user::downloads))
        .route("/api/user/feedback", get(user::feedback))
        .route("/api/user/reports", get(user::reports))
        .route("/api/downloads", post(downloads::record_download))
        .route("/api/feedback", post(feedback::create_feedback))
        .route("/api/reports", post(reports::create_report))
        .route_layer(middleware::from_fn(require_user_mw));

    let admin_only = Router::new()
        .route("/api/admin/apps", get(admin::list_all_apps).post(admin::upload_app).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/api/admin/apps/:id", patch(admin::update_app).delete(admin::delete_app))
        .route_layer(middleware::from_fn(require_admin_mw));

    Router::new()
        .merge(public)
        .merge(signed_in)
        .merge(admin_only)
        .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(track_metrics))
        .with_state(state)
}
