//! Catalog data-access layer.
//!
//! Every persistent read and write goes through [`CatalogStore`]. Absence is
//! reported as `Ok(None)`; everything else that can go wrong is a
//! [`StoreError`].
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use crate::config::{ServerConfig, StoreMode};
use crate::models::{App, AppPatch, Download, Feedback, NewApp, NewDownload, NewFeedback, NewReport, Report, UpsertUser, User, UserStats};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A foreign key target (user or app) does not exist.
    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),
    /// A unique constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> StoreResult<()>;

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    /// Insert on first sight of an identity, otherwise refresh the mutable profile fields.
    async fn upsert_user(&self, user: UpsertUser) -> StoreResult<User>;
    /// Create a bare record for a newly seen identity, or sync only its admin flag.
    /// Profile claims already stored are never touched.
    async fn ensure_user(&self, id: &str, is_admin: bool) -> StoreResult<User>;

    /// Whole catalog, newest first.
    async fn get_all_apps(&self) -> StoreResult<Vec<App>>;
    /// Active apps only, newest first.
    async fn get_active_apps(&self) -> StoreResult<Vec<App>>;
    async fn get_app(&self, id: Uuid) -> StoreResult<Option<App>>;
    async fn create_app(&self, app: NewApp) -> StoreResult<App>;
    async fn update_app(&self, id: Uuid, patch: AppPatch) -> StoreResult<Option<App>>;
    /// Hard delete. Downloads and reports keep their soft `app_id` reference.
    async fn delete_app(&self, id: Uuid) -> StoreResult<()>;
    /// Atomic `download_count + 1`.
    async fn increment_download_count(&self, id: Uuid) -> StoreResult<()>;

    async fn create_feedback(&self, feedback: NewFeedback) -> StoreResult<Feedback>;
    async fn get_user_feedback(&self, user_id: &str) -> StoreResult<Vec<Feedback>>;

    async fn create_report(&self, report: NewReport) -> StoreResult<Report>;
    async fn get_user_reports(&self, user_id: &str) -> StoreResult<Vec<Report>>;

    /// Append a download log row without touching the app counter.
    async fn create_download(&self, download: NewDownload) -> StoreResult<Download>;
    async fn get_user_downloads(&self, user_id: &str) -> StoreResult<Vec<Download>>;
    async fn get_user_stats(&self, user_id: &str) -> StoreResult<UserStats>;

    /// Log row and counter increment as one unit: either both happen or neither.
    /// Fails with `MissingReference("app")` for an unknown app.
    async fn record_download(&self, download: NewDownload) -> StoreResult<Download>;
}

pub type SharedStore = Arc<dyn CatalogStore>;

/// Build the configured backend. Postgres connects and applies migrations.
pub async fn from_config(cfg: &ServerConfig) -> anyhow::Result<SharedStore> {
    match cfg.store {
        StoreMode::Postgres => {
            let pool = crate::db::init_db(&cfg.database_url, cfg.db_max_connections).await?;
            info!(max_connections = cfg.db_max_connections, "store.init_postgres");
            Ok(Arc::new(PgStore::new(pool)))
        }
        StoreMode::Memory => {
            info!("store.init_memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
