/// Account endpoints
///
/// - `POST /v1/auth/signup` - Create an account (first account becomes admin)
/// - `POST /v1/auth/login` - Exchange handle/email and password for tokens
/// - `POST /v1/auth/refresh` - Exchange a refresh token for a new pair
/// - `POST /v1/auth/activate` - Confirm an email address
/// - `POST /v1/auth/password-reset` - Request a reset link
/// - `POST /v1/auth/password-reset/confirm` - Set a new password with a reset token

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use kinship_shared::{
    auth::{jwt, password, tokens},
    context::ActiveContext,
    invite,
    mail::{self, templates},
    models::{
        family::Family,
        group::Group,
        membership::FamilyMembership,
        token::{ActivationToken, PasswordResetToken},
        user::{CreateUser, User, UserRole},
    },
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Handles are 3-32 characters of letters, digits, `_`, `-` and `.`
pub fn is_valid_handle(handle: &str) -> bool {
    (3..=32).contains(&handle.len())
        && handle
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    pub handle: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Display name must be 1-100 characters"))]
    pub display_name: String,

    /// Creates a new family with the account as its first member
    #[validate(length(min = 1, max = 100, message = "Family name must be 1-100 characters"))]
    pub family_name: Option<String>,

    /// Joins an existing family
    pub invite_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: User,

    /// Only the very first account is approved at signup
    pub approved: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<Family>,

    /// Present when the account can sign in right away
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<jwt::TokenPair>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Handle or email address
    #[validate(length(min = 1, message = "Handle or email is required"))]
    pub login: String,

    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,

    #[serde(flatten)]
    pub tokens: jwt::TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,

    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Issues an activation token and mails the link; delivery is best effort
pub(crate) async fn send_activation(state: &AppState, user: &User) -> ApiResult<()> {
    let Some(email) = user.email.as_deref() else {
        return Ok(());
    };

    let (token, token_hash) = tokens::generate_link_token();
    ActivationToken::create(
        &state.db,
        &token_hash,
        user.id,
        Utc::now() + tokens::activation_ttl(),
    )
    .await?;

    let link = state.config.public_url(&format!("activate?token={}", token));
    let message = templates::activation(&state.config.mail.from, email, &link);
    mail::send_best_effort(state.mailer.as_ref(), message).await;

    Ok(())
}

/// Create an account
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/signup
///
/// {
///   "handle": "nana",
///   "email": "nana@example.com",
///   "password": "Sunday-lunch-7",
///   "display_name": "Nana",
///   "invite_code": "K7MQ2XPA"
/// }
/// ```
///
/// Either `family_name` or `invite_code` may be given, not both. The very
/// first account is created as an approved admin and receives tokens; every
/// later account waits for admin approval.
///
/// # Errors
///
/// - `400 Bad Request`: both `family_name` and `invite_code` given
/// - `404 Not Found`: unknown invite code
/// - `409 Conflict`: handle or email taken
/// - `422 Unprocessable Entity`: validation failed
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<SignupResponse>)> {
    req.validate()?;

    let handle = req.handle.trim().to_string();
    if !is_valid_handle(&handle) {
        return Err(ApiError::invalid_field(
            "handle",
            "Handle must be 3-32 letters, digits, '_', '-' or '.'",
        ));
    }
    password::validate_password_strength(&req.password)?;

    let family_name = trimmed(req.family_name);
    let invite_code = trimmed(req.invite_code);
    if family_name.is_some() && invite_code.is_some() {
        return Err(ApiError::BadRequest(
            "Provide either family_name or invite_code, not both".to_string(),
        ));
    }

    let invited_family = match invite_code {
        Some(code) => Some(
            Family::find_by_invite_code(&state.db, &invite::normalize_code(&code))
                .await?
                .ok_or_else(|| ApiError::NotFound("Invite code not found".to_string()))?,
        ),
        None => None,
    };

    let new_family_code = match family_name {
        Some(_) => {
            let pool = &state.db;
            Some(
                invite::generate_unique_code(|code| async move {
                    Family::code_exists(pool, &code).await
                })
                .await?,
            )
        }
        None => None,
    };

    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;

    User::lock_signups(&mut tx).await?;
    let first_user = !User::any_exist(&mut tx).await?;
    let mut user = User::create(
        &mut tx,
        CreateUser {
            handle,
            email: trimmed(req.email),
            password_hash,
            display_name: req.display_name.trim().to_string(),
            role: if first_user {
                UserRole::Admin
            } else {
                UserRole::Member
            },
            approved: first_user,
            family_id: invited_family.as_ref().map(|f| f.id),
        },
    )
    .await?;

    let family = match (invited_family, family_name, new_family_code) {
        (Some(family), _, _) => {
            FamilyMembership::record(&mut tx, family.id, user.id).await?;
            Some(family)
        }
        (None, Some(name), Some(code)) => {
            let family = Family::create(&mut tx, &name, &code).await?;
            Group::ensure_root_in(&mut tx, &family).await?;
            let context = ActiveContext::default().switch_family(family.id);
            User::set_context(&mut tx, user.id, context).await?;
            FamilyMembership::record(&mut tx, family.id, user.id).await?;
            user.family_id = context.family_id;
            Some(family)
        }
        _ => None,
    };

    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        handle = %user.handle,
        admin = first_user,
        family_id = ?user.family_id,
        "Account created"
    );

    send_activation(&state, &user).await?;

    let tokens = if user.approved {
        Some(jwt::issue_token_pair(user.id, state.jwt_secret())?)
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            approved: user.approved,
            user,
            family,
            tokens,
        }),
    ))
}

/// Sign in with handle or email
///
/// # Errors
///
/// - `401 Unauthorized`: unknown account or wrong password
/// - `403 Forbidden`: account awaiting approval
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let login = req.login.trim();
    let user = if login.contains('@') {
        User::find_by_email(&state.db, login).await?
    } else {
        User::find_by_handle(&state.db, login).await?
    };

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());
    let user = user.ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login with wrong password");
        return Err(invalid());
    }

    if !user.approved {
        return Err(ApiError::Forbidden(
            "Account is awaiting admin approval".to_string(),
        ));
    }

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse { user, tokens }))
}

/// Exchange a refresh token for a fresh token pair
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<jwt::TokenPair>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, state.jwt_secret())?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    if !user.approved {
        return Err(ApiError::Forbidden(
            "Account is awaiting admin approval".to_string(),
        ));
    }

    Ok(Json(jwt::issue_token_pair(user.id, state.jwt_secret())?))
}

/// Confirm an email address with the emailed token
pub async fn activate(
    State(state): State<AppState>,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let token = req.token.trim();
    let not_found = || ApiError::NotFound("Activation link is invalid or was already used".to_string());

    if !tokens::is_well_formed_link_token(token) {
        return Err(not_found());
    }

    let mut tx = state.db.begin().await?;
    let record = ActivationToken::take(&mut tx, &tokens::hash_token(token))
        .await?
        .ok_or_else(not_found)?;

    if record.is_expired(Utc::now()) {
        // Consuming the expired row is intended
        tx.commit().await?;
        return Err(ApiError::BadRequest("Activation link has expired".to_string()));
    }

    User::mark_email_verified(&mut tx, record.user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id = %record.user_id, "Email verified");

    Ok(Json(MessageResponse {
        message: "Email address confirmed",
    }))
}

/// Request a password reset link
///
/// Always answers `202 Accepted` so the endpoint does not reveal which
/// addresses have accounts.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    req.validate()?;

    if let Some(user) = User::find_by_email(&state.db, req.email.trim()).await? {
        let (token, token_hash) = tokens::generate_link_token();
        PasswordResetToken::create(
            &state.db,
            &token_hash,
            user.id,
            Utc::now() + tokens::password_reset_ttl(),
        )
        .await?;

        let link = state.config.public_url(&format!("reset-password?token={}", token));
        let to = user.email.as_deref().unwrap_or(req.email.trim());
        let message = templates::password_reset(&state.config.mail.from, to, &link);
        mail::send_best_effort(state.mailer.as_ref(), message).await;

        tracing::info!(user_id = %user.id, "Password reset requested");
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If the address has an account, a reset link is on its way",
        }),
    ))
}

/// Set a new password using a reset token
///
/// # Errors
///
/// - `400 Bad Request`: token unknown, used or expired
/// - `422 Unprocessable Entity`: password too weak
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> ApiResult<Json<MessageResponse>> {
    password::validate_password_strength(&req.password)?;

    let token = req.token.trim();
    let rejected = || ApiError::BadRequest("Reset link is invalid or has expired".to_string());
    if !tokens::is_well_formed_link_token(token) {
        return Err(rejected());
    }

    let token_hash = tokens::hash_token(token);
    let password_hash = password::hash_password(&req.password)?;

    let mut tx = state.db.begin().await?;
    let record = PasswordResetToken::find_for_update(&mut tx, &token_hash)
        .await?
        .ok_or_else(rejected)?;

    if !record.is_usable(Utc::now()) {
        return Err(rejected());
    }

    User::set_password_hash(&mut tx, record.user_id, &password_hash).await?;
    PasswordResetToken::mark_used(&mut tx, &token_hash).await?;
    tx.commit().await?;

    tracing::info!(user_id = %record.user_id, "Password reset completed");

    Ok(Json(MessageResponse {
        message: "Password updated",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_rules() {
        assert!(is_valid_handle("nana"));
        assert!(is_valid_handle("uncle.bob_2"));
        assert!(!is_valid_handle("ab"));
        assert!(!is_valid_handle("has space"));
        assert!(!is_valid_handle(&"x".repeat(33)));
        assert!(!is_valid_handle("émile"));
    }

    #[test]
    fn test_trimmed_drops_blank() {
        assert_eq!(trimmed(Some("  ".to_string())), None);
        assert_eq!(trimmed(Some(" Smiths ".to_string())), Some("Smiths".to_string()));
        assert_eq!(trimmed(None), None);
    }

    #[test]
    fn test_signup_validation() {
        let req = SignupRequest {
            handle: "nana".to_string(),
            email: Some("not-an-email".to_string()),
            password: "Sunday-lunch-7".to_string(),
            display_name: String::new(),
            family_name: None,
            invite_code: None,
        };

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("display_name"));
    }
}
