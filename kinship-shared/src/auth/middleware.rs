/// Request authentication
///
/// Bearer access tokens are validated, then the user row is reloaded so the
/// injected [`AuthContext`] reflects the current role, approval state and
/// active family. The API crate wraps [`authenticate`] in an axum middleware
/// and inserts the context into request extensions.
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use kinship_shared::auth::middleware::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("User: {}, family: {:?}", auth.user_id, auth.family_id)
/// }
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};
use crate::context::ActiveContext;
use crate::models::user::{User, UserRole};

/// Authenticated caller, attached to every protected request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,

    pub role: UserRole,

    /// Active family
    pub family_id: Option<Uuid>,

    /// Active group within the family
    pub group_id: Option<Uuid>,

    pub approved: bool,
}

impl AuthContext {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            family_id: user.family_id,
            group_id: user.group_id,
            approved: user.approved,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn active_context(&self) -> ActiveContext {
        ActiveContext {
            family_id: self.family_id,
            group_id: self.group_id,
        }
    }

    /// Active family id, or `None` when the caller has not joined one yet
    pub fn require_family(&self) -> Option<Uuid> {
        self.family_id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(&'static str),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    #[error("Account no longer exists")]
    UnknownUser,

    #[error("Account is awaiting admin approval")]
    PendingApproval,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Extracts the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Authorization header is not valid ASCII"))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidFormat("Expected Bearer token"))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::InvalidFormat("Expected Bearer token"));
    }

    Ok(token)
}

/// Resolves request headers into the caller's context
///
/// Pending users are turned away here, so every handler behind the
/// middleware can assume an approved caller.
pub async fn authenticate(
    pool: &PgPool,
    secret: &str,
    headers: &HeaderMap,
) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;
    let claims = validate_access_token(token, secret)?;

    let user = User::find_by_id(pool, claims.sub)
        .await?
        .ok_or(AuthError::UnknownUser)?;

    if !user.approved {
        tracing::debug!(user_id = %user.id, "Rejected request from unapproved user");
        return Err(AuthError::PendingApproval);
    }

    Ok(AuthContext::from_user(&user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        let headers = headers_with("Bearer abc.def.ghi");
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
    }

    #[test]
    fn test_wrong_scheme() {
        assert!(matches!(
            bearer_token(&headers_with("Basic dXNlcjpwYXNz")),
            Err(AuthError::InvalidFormat(_))
        ));
        assert!(matches!(
            bearer_token(&headers_with("Bearer ")),
            Err(AuthError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_context_accessors() {
        let family_id = Uuid::new_v4();
        let group_id = Uuid::new_v4();
        let auth = AuthContext {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
            family_id: Some(family_id),
            group_id: Some(group_id),
            approved: true,
        };

        assert!(auth.is_admin());
        assert_eq!(auth.require_family(), Some(family_id));
        assert_eq!(auth.active_context().group_id, Some(group_id));
    }
}
