use axum::{async_trait, extract::{FromRequestParts, Request, State}, http::{header, request::Parts, HeaderMap}, middleware::Next, response::{IntoResponse, Response}};
use sha2::{Digest, Sha256};
use crate::{config::TokenSpec, error::ApiError, store::CatalogStore, AppState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role { Admin, User }

/// Verified caller. `subject` doubles as the user id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity { pub role: Role, pub subject: String }

impl Identity {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

// Constant-time equality
fn ct_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() { return false; }
    let mut diff: u8 = 0;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) { diff |= x ^ y; }
    diff == 0
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() == 2 && parts[0].eq_ignore_ascii_case("Bearer") { Some(parts[1].trim().to_string()) } else { None }
}

/// Accepted bearer tokens. Only SHA-256 digests are held in memory.
#[derive(Debug, Default)]
pub struct TokenRegistry { entries: Vec<(String, Identity)> }

impl TokenRegistry {
    pub fn new(specs: &[TokenSpec]) -> Self {
        let entries = specs.iter().map(|s| {
            let role = if s.admin { Role::Admin } else { Role::User };
            (hash_token(&s.token), Identity { role, subject: s.subject.clone() })
        }).collect();
        Self { entries }
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn resolve(&self, token: &str) -> Option<Identity> {
        let digest = hash_token(token);
        // no early exit so timing does not reveal which entry matched
        let mut found = None;
        for (hash, ident) in &self.entries {
            if ct_equal(hash, &digest) && found.is_none() { found = Some(ident.clone()); }
        }
        found
    }
}

/// Attaches an [`Identity`] when a valid bearer token is present and makes
/// sure the identity has a user record.
/// Requests without a token pass through anonymously; a bad token is a 401.
pub async fn auth_layer(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, Response> {
    // Operational endpoints never look at credentials
    let path = req.uri().path().to_string();
    if matches!(path.as_str(), "/health" | "/readyz" | "/metrics" | "/openapi.json" | "/swagger") {
        return Ok(next.run(req).await);
    }
    if req.headers().contains_key(header::AUTHORIZATION) {
        let Some(token) = extract_bearer(req.headers()) else {
            tracing::debug!(%path, "auth_malformed_header");
            return Err(ApiError::unauthorized("malformed authorization header").into_response());
        };
        let Some(identity) = state.tokens.resolve(&token) else {
            tracing::debug!(%path, "auth_invalid_token");
            return Err(ApiError::unauthorized("invalid token").into_response());
        };
        register_identity(&*state.store, &identity).await.map_err(IntoResponse::into_response)?;
        tracing::debug!(%path, subject=%identity.subject, admin=identity.is_admin(), "auth_ok");
        req.extensions_mut().insert(identity);
    }
    Ok(next.run(req).await)
}

/// First authenticated request creates the user; a role change on the token
/// is carried over to the stored admin flag.
pub async fn register_identity(store: &dyn CatalogStore, identity: &Identity) -> Result<(), ApiError> {
    match store.get_user(&identity.subject).await? {
        Some(user) if user.is_admin == identity.is_admin() => {}
        existing => {
            store.ensure_user(&identity.subject, identity.is_admin()).await?;
            tracing::info!(user_id=%identity.subject, first_seen=existing.is_none(), admin=identity.is_admin(), "user_registered");
        }
    }
    Ok(())
}

pub fn require_user(identity: Option<&Identity>) -> Result<(), ApiError> {
    identity.map(|_| ()).ok_or_else(|| ApiError::unauthorized("authentication required"))
}

pub fn require_admin(identity: Option<&Identity>) -> Result<(), ApiError> {
    match identity {
        Some(id) if id.is_admin() => Ok(()),
        Some(_) => Err(ApiError::forbidden("admin required")),
        None => Err(ApiError::unauthorized("authentication required")),
    }
}

pub async fn require_user_mw(req: Request, next: Next) -> Result<Response, Response> {
    require_user(req.extensions().get::<Identity>()).map_err(IntoResponse::into_response)?;
    Ok(next.run(req).await)
}

pub async fn require_admin_mw(req: Request, next: Next) -> Result<Response, Response> {
    require_admin(req.extensions().get::<Identity>()).map_err(IntoResponse::into_response)?;
    Ok(next.run(req).await)
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Identity>().cloned().ok_or_else(|| ApiError::unauthorized("authentication required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    fn registry() -> TokenRegistry {
        TokenRegistry::new(&[TokenSpec::parse("t_admin:admin:alice").unwrap(), TokenSpec::parse("t_user:user:bob").unwrap()])
    }

    #[test]
    fn resolves_known_tokens_only() {
        let reg = registry();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.resolve("t_admin"), Some(Identity { role: Role::Admin, subject: "alice".into() }));
        assert_eq!(reg.resolve("t_user").map(|i| i.subject), Some("bob".to_string()));
        assert!(reg.resolve("t_use").is_none());
        assert!(reg.resolve("").is_none());
    }

    #[test]
    fn bearer_extraction() {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer  abc "));
        assert_eq!(extract_bearer(&h).as_deref(), Some("abc"));
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&h).is_none());
    }

    #[test]
    fn guards() {
        let admin = Identity { role: Role::Admin, subject: "a".into() };
        let user = Identity { role: Role::User, subject: "u".into() };
        assert!(require_admin(Some(&admin)).is_ok());
        assert_eq!(require_admin(Some(&user)).unwrap_err().status, StatusCode::FORBIDDEN);
        assert_eq!(require_admin(None).unwrap_err().status, StatusCode::UNAUTHORIZED);
        assert!(require_user(Some(&user)).is_ok());
        assert_eq!(require_user(None).unwrap_err().status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn first_request_registers_and_role_changes_sync() {
        use crate::{models::UpsertUser, store::MemoryStore};
        let store = MemoryStore::new();
        let bob = Identity { role: Role::User, subject: "bob".into() };
        register_identity(&store, &bob).await.unwrap();
        let user = store.get_user("bob").await.unwrap().unwrap();
        assert!(!user.is_admin && user.email.is_none());

        store.upsert_user(UpsertUser { id: "bob".into(), email: Some("bob@example.com".into()), ..Default::default() }).await.unwrap();
        let promoted = Identity { role: Role::Admin, subject: "bob".into() };
        register_identity(&store, &promoted).await.unwrap();
        let user = store.get_user("bob").await.unwrap().unwrap();
        assert!(user.is_admin);
        assert_eq!(user.email.as_deref(), Some("bob@example.com"));
    }
}
