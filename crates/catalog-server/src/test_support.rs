//! Shared fixtures for unit and integration tests: an in-memory `AppState`,
//! an optional Postgres store, and request/response helpers.
use axum::{body::Body, http::{header, Request, Response}};
use std::{path::Path, sync::Arc};
use crate::{
    auth::TokenRegistry,
    config::TokenSpec,
    packages::PackageStore,
    store::{MemoryStore, PgStore},
    AppState,
};

pub const ADMIN_TOKEN: &str = "t_admin";
pub const ADMIN_SUBJECT: &str = "alice";
pub const USER_TOKEN: &str = "t_user";
pub const USER_SUBJECT: &str = "bob";
pub const TEST_MAX_UPLOAD_BYTES: u64 = 64 * 1024;

/// Minimal bytes that pass the ZIP signature check.
pub const ZIP_STUB: &[u8] = b"PK\x05\x06\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0";

pub fn test_tokens() -> TokenRegistry {
    let specs: Vec<TokenSpec> = [format!("{ADMIN_TOKEN}:admin:{ADMIN_SUBJECT}"), format!("{USER_TOKEN}:user:{USER_SUBJECT}")]
        .iter()
        .filter_map(|raw| TokenSpec::parse(raw).ok())
        .collect();
    TokenRegistry::new(&specs)
}

/// Memory-backed state with packages under `dir` and the two test tokens.
pub async fn memory_state(dir: &Path) -> AppState {
    let packages = PackageStore::new(dir.join("downloads"), TEST_MAX_UPLOAD_BYTES, true);
    if let Err(e) = packages.init().await { panic!("package dir init failed: {e}"); }
    AppState {
        store: Arc::new(MemoryStore::new()),
        packages: Arc::new(packages),
        tokens: Arc::new(test_tokens()),
        download_requires_auth: false,
    }
}

/// Postgres store on `DATABASE_URL` with migrations applied and catalog tables emptied.
/// `None` when the variable is unset so the caller can skip.
pub async fn pg_store() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = match crate::db::init_db(&url, 5).await {
        Ok(p) => p,
        Err(e) => panic!("DATABASE_URL set but unusable: {e}"),
    };
    for table in ["downloads", "reports", "feedback", "apps", "users"] {
        let _ = sqlx::query(&format!("DELETE FROM {table}")).execute(&pool).await;
    }
    Some(PgStore::new(pool))
}

pub fn bearer(token: &str) -> String { format!("Bearer {token}") }

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(t) = token { builder = builder.header(header::AUTHORIZATION, bearer(t)); }
    builder.body(Body::from(body.to_string())).unwrap_or_else(|e| panic!("bad request: {e}"))
}

pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(t) = token { builder = builder.header(header::AUTHORIZATION, bearer(t)); }
    builder.body(Body::empty()).unwrap_or_else(|e| panic!("bad request: {e}"))
}

const BOUNDARY: &str = "catalog-test-boundary";

/// `multipart/form-data` upload request with text fields and an optional file part.
pub fn upload_request(token: Option<&str>, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes());
    }
    if let Some((file_name, bytes)) = file {
        body.extend_from_slice(format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/zip\r\n\r\n"
        ).as_bytes());
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/admin/apps")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(t) = token { builder = builder.header(header::AUTHORIZATION, bearer(t)); }
    builder.body(Body::from(body)).unwrap_or_else(|e| panic!("bad request: {e}"))
}

pub async fn body_bytes(res: Response<Body>) -> Vec<u8> {
    match axum::body::to_bytes(res.into_body(), usize::MAX).await {
        Ok(b) => b.to_vec(),
        Err(e) => panic!("body read failed: {e}"),
    }
}

pub async fn body_json(res: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(res).await;
    serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("invalid json ({e}): {}", String::from_utf8_lossy(&bytes)))
}

/// Default metadata fields for an upload.
pub fn app_fields(name: &str) -> Vec<(&str, &str)> {
    vec![("name", name), ("description", "A handy tool"), ("category", "utilities"), ("version", "1.0.0")]
}
