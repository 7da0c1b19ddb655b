use serde::{Serialize, Deserialize};
use utoipa::ToSchema;
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Suggested catalog categories. `App::category` stays free-form.
pub const SUGGESTED_CATEGORIES: &[&str] = &["utilities", "development", "system", "security", "multimedia", "networking"];

/// Suggested report issue types. `Report::issue_type` stays free-form.
pub const SUGGESTED_ISSUE_TYPES: &[&str] = &["bug", "download", "security", "broken", "other"];

pub const FEEDBACK_STATUS_PENDING: &str = "pending";
pub const REPORT_STATUS_OPEN: &str = "open";

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity subject issued by the external identity provider.
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written by a login. Keyed on `id`.
#[derive(Debug, Clone, Default)]
pub struct UpsertUser {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_admin: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub version: Option<String>,
    /// Generated storage name inside the package directory.
    pub file_name: String,
    pub file_size: Option<i64>,
    pub icon_url: Option<String>,
    pub download_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewApp {
    pub name: String,
    pub description: String,
    pub category: String,
    pub version: Option<String>,
    pub icon_url: Option<String>,
    pub file_name: String,
    pub file_size: Option<i64>,
    /// Defaults to active when `None`.
    pub is_active: Option<bool>,
}

/// Partial update; `None` leaves the column untouched.
/// The nullable columns take `Some(None)` to clear them.
#[derive(Debug, Clone, Default)]
pub struct AppPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub version: Option<Option<String>>,
    pub icon_url: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub id: Uuid,
    pub user_id: String,
    pub subject: String,
    pub message: String,
    pub rating: Option<i32>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback { pub user_id: String, pub subject: String, pub message: String, pub rating: Option<i32> }

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub user_id: String,
    pub app_id: Option<Uuid>,
    pub issue_type: String,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReport { pub user_id: String, pub app_id: Option<Uuid>, pub issue_type: String, pub description: String }

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub id: Uuid,
    pub user_id: String,
    pub app_id: Uuid,
    pub downloaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDownload { pub user_id: String, pub app_id: Uuid }

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, ToSchema)]
pub struct UserStats { pub downloads: i64, pub feedback: i64, pub reports: i64 }

/// Download history entry; `app` is `None` once the app has been deleted.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct DownloadWithApp {
    #[serde(flatten)]
    pub download: Download,
    pub app: Option<App>,
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct ReportWithApp {
    #[serde(flatten)]
    pub report: Report,
    pub app: Option<App>,
}
