//! In-process store used by tests and `CATALOG_STORE=memory` demos.
//!
//! Rows live in insertion order, so "newest first" is a reverse walk. Foreign
//! keys to users are checked the same way the Postgres schema does; app
//! references stay soft.
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::models::{App, AppPatch, Download, Feedback, NewApp, NewDownload, NewFeedback, NewReport, Report, UpsertUser, User, UserStats, FEEDBACK_STATUS_PENDING, REPORT_STATUS_OPEN};
use super::{CatalogStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    apps: Vec<App>,
    feedback: Vec<Feedback>,
    reports: Vec<Report>,
    downloads: Vec<Download>,
}

impl Tables {
    fn require_user(&self, user_id: &str) -> StoreResult<()> {
        if self.users.contains_key(user_id) { Ok(()) } else { Err(StoreError::MissingReference("user")) }
    }
}

#[derive(Default)]
pub struct MemoryStore { tables: RwLock<Tables> }

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl std::fmt::Debug for MemoryStore { fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("MemoryStore").finish() } }

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> { Ok(()) }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn upsert_user(&self, user: UpsertUser) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        if let Some(email) = user.email.as_deref() {
            if t.users.values().any(|u| u.id != user.id && u.email.as_deref() == Some(email)) {
                return Err(StoreError::Conflict("users_email_key".into()));
            }
        }
        let now = Utc::now();
        let row = t.users.entry(user.id.clone()).or_insert_with(|| User {
            id: user.id.clone(),
            email: None,
            first_name: None,
            last_name: None,
            profile_image_url: None,
            is_admin: false,
            created_at: now,
            updated_at: now,
        });
        row.email = user.email;
        row.first_name = user.first_name;
        row.last_name = user.last_name;
        row.profile_image_url = user.profile_image_url;
        row.is_admin = user.is_admin;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn ensure_user(&self, id: &str, is_admin: bool) -> StoreResult<User> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let row = t.users.entry(id.to_string()).or_insert_with(|| User {
            id: id.to_string(),
            email: None,
            first_name: None,
            last_name: None,
            profile_image_url: None,
            is_admin,
            created_at: now,
            updated_at: now,
        });
        if row.is_admin != is_admin {
            row.is_admin = is_admin;
            row.updated_at = now;
        }
        Ok(row.clone())
    }

    async fn get_all_apps(&self) -> StoreResult<Vec<App>> {
        Ok(self.tables.read().await.apps.iter().rev().cloned().collect())
    }

    async fn get_active_apps(&self) -> StoreResult<Vec<App>> {
        Ok(self.tables.read().await.apps.iter().rev().filter(|a| a.is_active).cloned().collect())
    }

    async fn get_app(&self, id: Uuid) -> StoreResult<Option<App>> {
        Ok(self.tables.read().await.apps.iter().find(|a| a.id == id).cloned())
    }

    async fn create_app(&self, app: NewApp) -> StoreResult<App> {
        let now = Utc::now();
        let row = App {
            id: Uuid::new_v4(),
            name: app.name,
            description: app.description,
            category: app.category,
            version: app.version,
            file_name: app.file_name,
            file_size: app.file_size,
            icon_url: app.icon_url,
            download_count: 0,
            is_active: app.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.apps.push(row.clone());
        Ok(row)
    }

    async fn update_app(&self, id: Uuid, patch: AppPatch) -> StoreResult<Option<App>> {
        let mut t = self.tables.write().await;
        let Some(app) = t.apps.iter_mut().find(|a| a.id == id) else { return Ok(None) };
        if let Some(v) = patch.name { app.name = v; }
        if let Some(v) = patch.description { app.description = v; }
        if let Some(v) = patch.category { app.category = v; }
        if let Some(v) = patch.version { app.version = v; }
        if let Some(v) = patch.icon_url { app.icon_url = v; }
        if let Some(v) = patch.is_active { app.is_active = v; }
        app.updated_at = Utc::now();
        Ok(Some(app.clone()))
    }

    async fn delete_app(&self, id: Uuid) -> StoreResult<()> {
        self.tables.write().await.apps.retain(|a| a.id != id);
        Ok(())
    }

    async fn increment_download_count(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        if let Some(app) = t.apps.iter_mut().find(|a| a.id == id) { app.download_count += 1; }
        Ok(())
    }

    async fn create_feedback(&self, feedback: NewFeedback) -> StoreResult<Feedback> {
        let mut t = self.tables.write().await;
        t.require_user(&feedback.user_id)?;
        let row = Feedback {
            id: Uuid::new_v4(),
            user_id: feedback.user_id,
            subject: feedback.subject,
            message: feedback.message,
            rating: feedback.rating,
            status: FEEDBACK_STATUS_PENDING.into(),
            created_at: Utc::now(),
        };
        t.feedback.push(row.clone());
        Ok(row)
    }

    async fn get_user_feedback(&self, user_id: &str) -> StoreResult<Vec<Feedback>> {
        Ok(self.tables.read().await.feedback.iter().rev().filter(|f| f.user_id == user_id).cloned().collect())
    }

    async fn create_report(&self, report: NewReport) -> StoreResult<Report> {
        let mut t = self.tables.write().await;
        t.require_user(&report.user_id)?;
        let row = Report {
            id: Uuid::new_v4(),
            user_id: report.user_id,
            app_id: report.app_id,
            issue_type: report.issue_type,
            description: report.description,
            status: REPORT_STATUS_OPEN.into(),
            created_at: Utc::now(),
        };
        t.reports.push(row.clone());
        Ok(row)
    }

    async fn get_user_reports(&self, user_id: &str) -> StoreResult<Vec<Report>> {
        Ok(self.tables.read().await.reports.iter().rev().filter(|r| r.user_id == user_id).cloned().collect())
    }

    async fn create_download(&self, download: NewDownload) -> StoreResult<Download> {
        let mut t = self.tables.write().await;
        t.require_user(&download.user_id)?;
        let row = Download { id: Uuid::new_v4(), user_id: download.user_id, app_id: download.app_id, downloaded_at: Utc::now() };
        t.downloads.push(row.clone());
        Ok(row)
    }

    async fn get_user_downloads(&self, user_id: &str) -> StoreResult<Vec<Download>> {
        Ok(self.tables.read().await.downloads.iter().rev().filter(|d| d.user_id == user_id).cloned().collect())
    }

    async fn get_user_stats(&self, user_id: &str) -> StoreResult<UserStats> {
        let t = self.tables.read().await;
        Ok(UserStats {
            downloads: t.downloads.iter().filter(|d| d.user_id == user_id).count() as i64,
            feedback: t.feedback.iter().filter(|f| f.user_id == user_id).count() as i64,
            reports: t.reports.iter().filter(|r| r.user_id == user_id).count() as i64,
        })
    }

    async fn record_download(&self, download: NewDownload) -> StoreResult<Download> {
        let mut t = self.tables.write().await;
        t.require_user(&download.user_id)?;
        let Some(app) = t.apps.iter_mut().find(|a| a.id == download.app_id) else { return Err(StoreError::MissingReference("app")) };
        app.download_count += 1;
        let row = Download { id: Uuid::new_v4(), user_id: download.user_id, app_id: download.app_id, downloaded_at: Utc::now() };
        t.downloads.push(row.clone());
        Ok(row)
    }
}
