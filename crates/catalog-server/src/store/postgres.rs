use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;
use crate::models::{App, AppPatch, Download, Feedback, NewApp, NewDownload, NewFeedback, NewReport, Report, UpsertUser, User, UserStats};
use super::{CatalogStore, StoreError, StoreResult};

const USER_COLUMNS: &str = "id, email, first_name, last_name, profile_image_url, is_admin, created_at, updated_at";
const APP_COLUMNS: &str = "id, name, description, category, version, file_name, file_size, icon_url, download_count, is_active, created_at, updated_at";
const FEEDBACK_COLUMNS: &str = "id, user_id, subject, message, rating, status, created_at";
const REPORT_COLUMNS: &str = "id, user_id, app_id, issue_type, description, status, created_at";
const DOWNLOAD_COLUMNS: &str = "id, user_id, app_id, downloaded_at";

// SQLSTATE codes
const FOREIGN_KEY_VIOLATION: &str = "23503";
const UNIQUE_VIOLATION: &str = "23505";

/// Map constraint violations onto the store taxonomy. `reference` names the
/// entity a foreign key violation points at.
fn classify(e: sqlx::Error, reference: &'static str) -> StoreError {
    if let Some(db) = e.as_database_error() {
        match db.code().as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::MissingReference(reference),
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string()),
            _ => {}
        }
    }
    StoreError::Database(e)
}

#[derive(Debug, Clone)]
pub struct PgStore { pool: Pool<Postgres> }

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    pub fn pool(&self) -> &Pool<Postgres> { &self.pool }

    async fn count_for_user(&self, table: &str, user_id: &str) -> StoreResult<i64> {
        let n = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table} WHERE user_id = $1"))
            .bind(user_id)
            .fetch_one(&self.pool).await?;
        Ok(n)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool).await?;
        Ok(user)
    }

    async fn upsert_user(&self, user: UpsertUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, first_name, last_name, profile_image_url, is_admin) VALUES ($1,$2,$3,$4,$5,$6) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email, first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name, \
             profile_image_url = EXCLUDED.profile_image_url, is_admin = EXCLUDED.is_admin, updated_at = now() \
             RETURNING {USER_COLUMNS}"))
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.profile_image_url)
            .bind(user.is_admin)
            .fetch_one(&self.pool).await
            .map_err(|e| classify(e, "user"))
    }

    async fn ensure_user(&self, id: &str, is_admin: bool) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, is_admin) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET is_admin = EXCLUDED.is_admin, updated_at = now() \
             RETURNING {USER_COLUMNS}"))
            .bind(id)
            .bind(is_admin)
            .fetch_one(&self.pool).await
            .map_err(|e| classify(e, "user"))
    }

    async fn get_all_apps(&self) -> StoreResult<Vec<App>> {
        let apps = sqlx::query_as::<_, App>(&format!("SELECT {APP_COLUMNS} FROM apps ORDER BY created_at DESC"))
            .fetch_all(&self.pool).await?;
        Ok(apps)
    }

    async fn get_active_apps(&self) -> StoreResult<Vec<App>> {
        let apps = sqlx::query_as::<_, App>(&format!("SELECT {APP_COLUMNS} FROM apps WHERE is_active ORDER BY created_at DESC"))
            .fetch_all(&self.pool).await?;
        Ok(apps)
    }

    async fn get_app(&self, id: Uuid) -> StoreResult<Option<App>> {
        let app = sqlx::query_as::<_, App>(&format!("SELECT {APP_COLUMNS} FROM apps WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool).await?;
        Ok(app)
    }

    async fn create_app(&self, app: NewApp) -> StoreResult<App> {
        let created = sqlx::query_as::<_, App>(&format!(
            "INSERT INTO apps (name, description, category, version, icon_url, file_name, file_size, is_active) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,COALESCE($8, TRUE)) RETURNING {APP_COLUMNS}"))
            .bind(&app.name)
            .bind(&app.description)
            .bind(&app.category)
            .bind(&app.version)
            .bind(&app.icon_url)
            .bind(&app.file_name)
            .bind(app.file_size)
            .bind(app.is_active)
            .fetch_one(&self.pool).await?;
        Ok(created)
    }

    async fn update_app(&self, id: Uuid, patch: AppPatch) -> StoreResult<Option<App>> {
        let updated = sqlx::query_as::<_, App>(&format!(
            "UPDATE apps SET name = COALESCE($2, name), description = COALESCE($3, description), category = COALESCE($4, category), \
             version = CASE WHEN $5 THEN $6 ELSE version END, icon_url = CASE WHEN $7 THEN $8 ELSE icon_url END, \
             is_active = COALESCE($9, is_active), updated_at = now() \
             WHERE id = $1 RETURNING {APP_COLUMNS}"))
            .bind(id)
            .bind(&patch.name)
            .bind(&patch.description)
            .bind(&patch.category)
            .bind(patch.version.is_some())
            .bind(patch.version.flatten())
            .bind(patch.icon_url.is_some())
            .bind(patch.icon_url.flatten())
            .bind(patch.is_active)
            .fetch_optional(&self.pool).await?;
        Ok(updated)
    }

    async fn delete_app(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM apps WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn increment_download_count(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE apps SET download_count = download_count + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn create_feedback(&self, feedback: NewFeedback) -> StoreResult<Feedback> {
        sqlx::query_as::<_, Feedback>(&format!(
            "INSERT INTO feedback (user_id, subject, message, rating) VALUES ($1,$2,$3,$4) RETURNING {FEEDBACK_COLUMNS}"))
            .bind(&feedback.user_id)
            .bind(&feedback.subject)
            .bind(&feedback.message)
            .bind(feedback.rating)
            .fetch_one(&self.pool).await
            .map_err(|e| classify(e, "user"))
    }

    async fn get_user_feedback(&self, user_id: &str) -> StoreResult<Vec<Feedback>> {
        let rows = sqlx::query_as::<_, Feedback>(&format!("SELECT {FEEDBACK_COLUMNS} FROM feedback WHERE user_id = $1 ORDER BY created_at DESC"))
            .bind(user_id)
            .fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn create_report(&self, report: NewReport) -> StoreResult<Report> {
        sqlx::query_as::<_, Report>(&format!(
            "INSERT INTO reports (user_id, app_id, issue_type, description) VALUES ($1,$2,$3,$4) RETURNING {REPORT_COLUMNS}"))
            .bind(&report.user_id)
            .bind(report.app_id)
            .bind(&report.issue_type)
            .bind(&report.description)
            .fetch_one(&self.pool).await
            .map_err(|e| classify(e, "user"))
    }

    async fn get_user_reports(&self, user_id: &str) -> StoreResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, Report>(&format!("SELECT {REPORT_COLUMNS} FROM reports WHERE user_id = $1 ORDER BY created_at DESC"))
            .bind(user_id)
            .fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn create_download(&self, download: NewDownload) -> StoreResult<Download> {
        sqlx::query_as::<_, Download>(&format!("INSERT INTO downloads (user_id, app_id) VALUES ($1,$2) RETURNING {DOWNLOAD_COLUMNS}"))
            .bind(&download.user_id)
            .bind(download.app_id)
            .fetch_one(&self.pool).await
            .map_err(|e| classify(e, "user"))
    }

    async fn get_user_downloads(&self, user_id: &str) -> StoreResult<Vec<Download>> {
        let rows = sqlx::query_as::<_, Download>(&format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads WHERE user_id = $1 ORDER BY downloaded_at DESC"))
            .bind(user_id)
            .fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn get_user_stats(&self, user_id: &str) -> StoreResult<UserStats> {
        let downloads = self.count_for_user("downloads", user_id).await?;
        let feedback = self.count_for_user("feedback", user_id).await?;
        let reports = self.count_for_user("reports", user_id).await?;
        Ok(UserStats { downloads, feedback, reports })
    }

    async fn record_download(&self, download: NewDownload) -> StoreResult<Download> {
        let mut tx = self.pool.begin().await?;
        let bumped = sqlx::query("UPDATE apps SET download_count = download_count + 1 WHERE id = $1")
            .bind(download.app_id)
            .execute(&mut *tx).await?;
        if bumped.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::MissingReference("app"));
        }
        let row = sqlx::query_as::<_, Download>(&format!("INSERT INTO downloads (user_id, app_id) VALUES ($1,$2) RETURNING {DOWNLOAD_COLUMNS}"))
            .bind(&download.user_id)
            .bind(download.app_id)
            .fetch_one(&mut *tx).await
            .map_err(|e| classify(e, "user"))?;
        tx.commit().await?;
        Ok(row)
    }
}
