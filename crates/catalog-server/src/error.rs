use axum::{response::{IntoResponse, Response}, Json, http::StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;
use std::fmt::{Display, Formatter};
use crate::{packages::PackageError, store::StoreError};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub code: &'static str,
    pub message: String,
    /// Per-field validation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone)]
pub struct ApiError { pub status: StatusCode, pub code: &'static str, pub message: String, pub fields: Option<BTreeMap<String, Vec<String>>> }

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), fields: None }
    }
    pub fn not_found(msg: impl Into<String>) -> Self { Self::new(StatusCode::NOT_FOUND, "not_found", msg) }
    pub fn conflict(msg: impl Into<String>) -> Self { Self::new(StatusCode::CONFLICT, "conflict", msg) }
    pub fn internal(msg: impl Into<String>) -> Self { Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg) }
    pub fn bad_request(msg: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "bad_request", msg) }
    pub fn unauthorized(msg: impl Into<String>) -> Self { Self::new(StatusCode::UNAUTHORIZED, "unauthorized", msg) }
    pub fn forbidden(msg: impl Into<String>) -> Self { Self::new(StatusCode::FORBIDDEN, "forbidden", msg) }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}: {}", self.code, self.message) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody { code: self.code, message: self.message, fields: self.fields };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (field, errs) in errors.field_errors() {
            let messages = errs.iter()
                .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                .collect();
            fields.insert(field.to_string(), messages);
        }
        Self { status: StatusCode::BAD_REQUEST, code: "validation_failed", message: "request failed validation".into(), fields: Some(fields) }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingReference("app") => Self::not_found("app not found"),
            StoreError::MissingReference("user") => Self::new(StatusCode::CONFLICT, "user_not_registered", "no user record for this identity"),
            StoreError::MissingReference(other) => Self::not_found(format!("{other} not found")),
            StoreError::Conflict(constraint) => Self::conflict(format!("duplicate value violates {constraint}")),
            StoreError::Database(err) => {
                tracing::error!(error=%err, "store_failure");
                Self::internal("storage failure")
            }
        }
    }
}

impl From<PackageError> for ApiError {
    fn from(e: PackageError) -> Self {
        match e {
            PackageError::InvalidExtension => Self::new(StatusCode::BAD_REQUEST, "invalid_file_type", "Only ZIP files are allowed"),
            PackageError::NotZip => Self::new(StatusCode::BAD_REQUEST, "invalid_package", "file content is not a ZIP archive"),
            PackageError::TooLarge { limit } => Self::new(StatusCode::BAD_REQUEST, "size_exceeded", format!("package exceeds max size of {limit} bytes")),
            PackageError::Io(err) => {
                tracing::error!(error=%err, "package_io_failure");
                Self::internal("package storage failure")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Probe {
        #[validate(length(min = 1, message = "subject is required"))]
        subject: String,
        #[validate(range(min = 1, max = 5))]
        rating: Option<i32>,
    }

    #[test]
    fn validation_errors_carry_field_detail() {
        let err: ApiError = Probe { subject: String::new(), rating: Some(9) }.validate().unwrap_err().into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "validation_failed");
        let fields = err.fields.unwrap();
        assert_eq!(fields["subject"], vec!["subject is required".to_string()]);
        assert_eq!(fields["rating"], vec!["range".to_string()]);
    }

    #[test]
    fn store_errors_map_to_statuses() {
        assert_eq!(ApiError::from(StoreError::MissingReference("app")).status, StatusCode::NOT_FOUND);
        let unregistered = ApiError::from(StoreError::MissingReference("user"));
        assert_eq!((unregistered.status, unregistered.code), (StatusCode::CONFLICT, "user_not_registered"));
        let internal = ApiError::from(StoreError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(internal.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!internal.message.contains("pool"), "internal detail must not leak");
    }
}
