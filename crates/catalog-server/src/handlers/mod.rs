pub mod admin;
pub mod apps;
pub mod downloads;
pub mod feedback;
pub mod health;
pub mod readiness;
pub mod reports;
pub mod session;
pub mod user;

use axum::{async_trait, extract::{FromRequest, Request}, Json};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use validator::Validate;
use crate::{error::{ApiError, ApiResult}, models::App, store::CatalogStore};

/// JSON body that has passed `validator` checks. Malformed JSON is a 400 like any other validation failure.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Unknown or malformed ids are both "not found".
pub(crate) fn parse_app_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found("app not found"))
}

/// Look up each distinct app once. Deleted apps are simply absent from the map.
pub(crate) async fn resolve_apps(store: &dyn CatalogStore, ids: impl Iterator<Item = Uuid>) -> ApiResult<HashMap<Uuid, App>> {
    let mut found = HashMap::new();
    for id in ids.collect::<HashSet<_>>() {
        if let Some(app) = store.get_app(id).await? { found.insert(id, app); }
    }
    Ok(found)
}
