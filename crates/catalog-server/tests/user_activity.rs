use axum::{http::StatusCode, Router};
use catalog_server::{build_router, test_support::*};
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn router() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(memory_state(dir.path()).await);
    (dir, app)
}

async fn send(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let res = app.clone().oneshot(json_request(method, uri, token, body)).await.unwrap();
    let status = res.status();
    let bytes = body_bytes(res).await;
    let v = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, v)
}

async fn fetch(app: &Router, uri: &str, token: &str) -> (StatusCode, Value) {
    let res = app.clone().oneshot(get_request(uri, Some(token))).await.unwrap();
    let status = res.status();
    (status, body_json(res).await)
}

#[tokio::test]
async fn login_upserts_profile() {
    let (_dir, app) = router().await;
    // the first authenticated request registers a bare record
    let (status, bare) = fetch(&app, "/api/auth/user", USER_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bare["id"], json!(USER_SUBJECT));
    assert_eq!(bare["email"], Value::Null);

    let (status, user) = send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({"email": "bob@example.com", "firstName": "Bob"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["id"], json!(USER_SUBJECT));
    assert_eq!(user["isAdmin"], json!(false));

    let (_, user) = send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({"firstName": "Robert"})).await;
    assert_eq!(user["firstName"], json!("Robert"));
    // omitted claims keep the stored value
    assert_eq!(user["email"], json!("bob@example.com"));

    let (status, me) = fetch(&app, "/api/auth/user", USER_TOKEN).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["firstName"], json!("Robert"));

    let (_, admin) = send(&app, "POST", "/api/login", Some(ADMIN_TOKEN), json!({})).await;
    assert_eq!(admin["isAdmin"], json!(true));
}

#[tokio::test]
async fn login_requires_token_and_valid_claims() {
    let (_dir, app) = router().await;
    let (status, _) = send(&app, "POST", "/api/login", None, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, v) = send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({"email": "nope"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["fields"]["email"].is_array());
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let (_dir, app) = router().await;
    send(&app, "POST", "/api/login", Some(ADMIN_TOKEN), json!({"email": "shared@example.com"})).await;
    let (status, v) = send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({"email": "shared@example.com"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(v["code"], "conflict");
}

#[tokio::test]
async fn feedback_validation_and_history() {
    let (_dir, app) = router().await;
    send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({})).await;

    let (status, v) = send(&app, "POST", "/api/feedback", Some(USER_TOKEN), json!({"subject": "", "message": "", "rating": 9})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["code"], "validation_failed");
    for field in ["subject", "message", "rating"] { assert!(v["fields"][field].is_array(), "{field}"); }

    let (status, _) = send(&app, "POST", "/api/feedback", Some(USER_TOKEN), json!({"subject": "x", "message": "y", "rating": "five"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = send(&app, "POST", "/api/feedback", Some(USER_TOKEN), json!({"subject": "Great", "message": "Works well", "rating": 5})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], json!("pending"));
    assert_eq!(created["userId"], json!(USER_SUBJECT));
    let (_, unrated) = send(&app, "POST", "/api/feedback", Some(USER_TOKEN), json!({"subject": "Idea", "message": "Dark mode"})).await;
    assert_eq!(unrated["rating"], Value::Null);

    let (_, history) = fetch(&app, "/api/user/feedback", USER_TOKEN).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["subject"], json!("Idea"));
}

#[tokio::test]
async fn writes_work_without_explicit_login() {
    let (_dir, app) = router().await;
    let (status, created) = send(&app, "POST", "/api/feedback", Some(USER_TOKEN), json!({"subject": "s", "message": "m"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["userId"], json!(USER_SUBJECT));
    let (status, _) = send(&app, "POST", "/api/reports", Some(USER_TOKEN), json!({"issueType": "bug", "description": "d"})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, me) = fetch(&app, "/api/auth/user", USER_TOKEN).await;
    assert_eq!(me["isAdmin"], json!(false));
    let (_, admin) = fetch(&app, "/api/auth/user", ADMIN_TOKEN).await;
    assert_eq!(admin["isAdmin"], json!(true));
    let (_, stats) = fetch(&app, "/api/user/stats", USER_TOKEN).await;
    assert_eq!(stats, json!({"downloads": 0, "feedback": 1, "reports": 1}));
}

#[tokio::test]
async fn later_requests_keep_login_claims() {
    let (_dir, app) = router().await;
    send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({"email": "bob@example.com", "lastName": "Builder"})).await;
    send(&app, "POST", "/api/feedback", Some(USER_TOKEN), json!({"subject": "s", "message": "m"})).await;
    let (_, me) = fetch(&app, "/api/auth/user", USER_TOKEN).await;
    assert_eq!(me["email"], json!("bob@example.com"));
    assert_eq!(me["lastName"], json!("Builder"));
}

#[tokio::test]
async fn reports_join_their_app() {
    let (_dir, app) = router().await;
    send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({})).await;
    let created = body_json(app.clone().oneshot(upload_request(Some(ADMIN_TOKEN), &app_fields("Tool"), Some(("tool.zip", ZIP_STUB)))).await.unwrap()).await;
    let app_id = created["id"].clone();

    let (status, _) = send(&app, "POST", "/api/reports", Some(USER_TOKEN), json!({"appId": "00000000-0000-0000-0000-000000000000", "issueType": "bug", "description": "d"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, v) = send(&app, "POST", "/api/reports", Some(USER_TOKEN), json!({"issueType": "", "description": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["fields"]["issue_type"].is_array());

    let (status, report) = send(&app, "POST", "/api/reports", Some(USER_TOKEN), json!({"appId": app_id, "issueType": "download", "description": "Link broken"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(report["status"], json!("open"));
    let (status, _) = send(&app, "POST", "/api/reports", Some(USER_TOKEN), json!({"issueType": "other", "description": "General"})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, reports) = fetch(&app, "/api/user/reports", USER_TOKEN).await;
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["app"], Value::Null);
    assert_eq!(reports[1]["app"]["id"], app_id);
    assert_eq!(reports[1]["issueType"], json!("download"));
}

#[tokio::test]
async fn stats_count_each_kind_independently() {
    let (_dir, app) = router().await;
    send(&app, "POST", "/api/login", Some(USER_TOKEN), json!({})).await;
    send(&app, "POST", "/api/login", Some(ADMIN_TOKEN), json!({})).await;
    let (_, empty) = fetch(&app, "/api/user/stats", USER_TOKEN).await;
    assert_eq!(empty, json!({"downloads": 0, "feedback": 0, "reports": 0}));

    let created = body_json(app.clone().oneshot(upload_request(Some(ADMIN_TOKEN), &app_fields("Tool"), Some(("tool.zip", ZIP_STUB)))).await.unwrap()).await;
    for _ in 0..3 { send(&app, "POST", "/api/downloads", Some(USER_TOKEN), json!({"appId": created["id"]})).await; }
    send(&app, "POST", "/api/feedback", Some(USER_TOKEN), json!({"subject": "s", "message": "m"})).await;
    // another user's activity does not leak into the counts
    send(&app, "POST", "/api/feedback", Some(ADMIN_TOKEN), json!({"subject": "s", "message": "m"})).await;

    let (_, stats) = fetch(&app, "/api/user/stats", USER_TOKEN).await;
    assert_eq!(stats, json!({"downloads": 3, "feedback": 1, "reports": 0}));
    let (status, _) = fetch(&app, "/api/user/stats", "bogus").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
