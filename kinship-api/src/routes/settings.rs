/// Account settings for the signed-in user
///
/// - `GET   /v1/settings` - Current account
/// - `PATCH /v1/settings/profile` - Display name, avatar URL, email, default location
/// - `PUT   /v1/settings/theme` - UI theme
/// - `PUT   /v1/settings/notifications` - Notification channel
/// - `POST  /v1/settings/password` - Change password (current password required)
/// - `POST  /v1/settings/test-email` - Send a test message to the account email
/// - `POST  /v1/settings/phone` - Start phone verification
/// - `POST  /v1/settings/phone/verify` - Confirm the phone with its code

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    routes::{
        auth::{send_activation, MessageResponse},
        double_option,
    },
};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use kinship_shared::{
    auth::{
        middleware::AuthContext,
        password::{hash_password, validate_password_strength, verify_password},
        tokens,
    },
    mail::{templates, Mailer},
    models::{
        token::PhoneVerification,
        user::{NotificationPreference, ThemePreference, UpdateProfile, User},
    },
};
use serde::{Deserialize, Serialize};
use validator::{ValidateEmail, ValidateUrl};

const MAX_DISPLAY_NAME_LENGTH: usize = 80;

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    pub default_location: Option<Option<String>>,
}

impl UpdateProfileRequest {
    fn into_update(self) -> ApiResult<UpdateProfile> {
        let display_name = match self.display_name {
            Some(name) => {
                let name = name.trim().to_string();
                if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
                    return Err(ApiError::invalid_field(
                        "display_name",
                        "Display name must be 1-80 characters",
                    ));
                }
                Some(name)
            }
            None => None,
        };

        let avatar_url = self.avatar_url.map(blank_to_none);
        if let Some(Some(url)) = &avatar_url {
            if !url.validate_url() {
                return Err(ApiError::invalid_field("avatar_url", "Avatar must be a valid URL"));
            }
        }

        let email = self.email.map(|e| blank_to_none(e).map(|e| e.to_lowercase()));
        if let Some(Some(address)) = &email {
            if !address.validate_email() {
                return Err(ApiError::invalid_field("email", "Invalid email address"));
            }
        }

        Ok(UpdateProfile {
            display_name,
            avatar_url,
            email,
            default_location: self.default_location.map(blank_to_none),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ThemeRequest {
    pub theme: ThemePreference,
}

#[derive(Debug, Deserialize)]
pub struct NotificationsRequest {
    pub preference: NotificationPreference,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,

    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct TestEmailResponse {
    pub sent_to: String,
}

#[derive(Debug, Deserialize)]
pub struct PhoneRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct PhoneVerificationStarted {
    pub phone: String,

    pub expires_at: DateTime<Utc>,

    /// Only returned outside production, where no SMS is sent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPhoneRequest {
    pub phone: String,

    pub code: String,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Digits with an optional leading `+`; spaces, dots, dashes and parentheses
/// are dropped
fn normalize_phone(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return None,
        }
    }

    if !(7..=15).contains(&digits.len()) {
        return None;
    }

    Some(format!("{plus}{digits}"))
}

/// Last four digits, for logs
fn mask_phone(phone: &str) -> String {
    let tail: String = phone
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("***{tail}")
}

async fn current_user(state: &AppState, auth: &AuthContext) -> ApiResult<User> {
    User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))
}

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    Ok(Json(current_user(&state, &auth).await?))
}

/// Update profile fields
///
/// Absent keys are left alone and `null` clears an optional field. Changing
/// the email resets its verified flag and sends a fresh activation link.
///
/// # Errors
///
/// - `409 Conflict`: the email belongs to another account
/// - `422 Unprocessable Entity`: invalid name, URL or email
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let update = req.into_update()?;
    let before = current_user(&state, &auth).await?;

    let user = User::update_profile(&state.db, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    if user.email.is_some() && user.email != before.email {
        send_activation(&state, &user).await?;
    }

    Ok(Json(user))
}

pub async fn set_theme(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ThemeRequest>,
) -> ApiResult<Json<User>> {
    User::set_theme(&state.db, auth.user_id, req.theme).await?;
    Ok(Json(current_user(&state, &auth).await?))
}

/// Choose the notification channel; the channel must be usable
pub async fn set_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<NotificationsRequest>,
) -> ApiResult<Json<User>> {
    let user = current_user(&state, &auth).await?;

    match req.preference {
        NotificationPreference::Email if user.email.is_none() => {
            return Err(ApiError::BadRequest(
                "Add an email address before choosing email notifications".to_string(),
            ));
        }
        NotificationPreference::Sms if !user.phone_verified => {
            return Err(ApiError::BadRequest(
                "Verify a phone number before choosing SMS notifications".to_string(),
            ));
        }
        _ => {}
    }

    User::set_notification_preference(&state.db, auth.user_id, req.preference).await?;
    Ok(Json(current_user(&state, &auth).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let user = current_user(&state, &auth).await?;

    if !verify_password(&req.current_password, &user.password_hash)? {
        return Err(ApiError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }
    validate_password_strength(&req.new_password)?;
    let password_hash = hash_password(&req.new_password)?;

    let mut conn = state.db.acquire().await?;
    User::set_password_hash(&mut conn, user.id, &password_hash).await?;

    tracing::info!(user_id = %user.id, "Password changed");

    Ok(Json(MessageResponse {
        message: "Password updated",
    }))
}

/// Send a test email; unlike account mail, a delivery failure is reported
pub async fn send_test_email(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<TestEmailResponse>> {
    let user = current_user(&state, &auth).await?;
    let email = user
        .email
        .ok_or_else(|| ApiError::BadRequest("No email address on this account".to_string()))?;

    state
        .mailer
        .send(templates::test_ping(&state.config.mail.from, &email))
        .await
        .map_err(|e| ApiError::UpstreamFailure(format!("Email delivery failed: {}", e)))?;

    Ok(Json(TestEmailResponse { sent_to: email }))
}

/// Issue a phone verification code
///
/// SMS delivery is a placeholder: the code is logged as sent, and outside
/// production it is returned in the response.
pub async fn start_phone_verification(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<PhoneRequest>,
) -> ApiResult<Json<PhoneVerificationStarted>> {
    let phone = normalize_phone(&req.phone)
        .ok_or_else(|| ApiError::invalid_field("phone", "Invalid phone number"))?;

    let code = tokens::generate_phone_code();
    let issued = PhoneVerification::issue(
        &state.db,
        &phone,
        auth.user_id,
        &code,
        Utc::now() + tokens::phone_code_ttl(),
    )
    .await?;

    tracing::info!(user_id = %auth.user_id, phone = %mask_phone(&phone), "SMS verification code dispatched");

    Ok(Json(PhoneVerificationStarted {
        phone: issued.phone,
        expires_at: issued.expires_at,
        code: (!state.config.api.production).then_some(code),
    }))
}

/// Confirm a phone number
///
/// A wrong code leaves the pending verification in place; an expired one is
/// discarded.
pub async fn verify_phone(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<VerifyPhoneRequest>,
) -> ApiResult<Json<User>> {
    let phone = normalize_phone(&req.phone)
        .ok_or_else(|| ApiError::invalid_field("phone", "Invalid phone number"))?;

    let mut tx = state.db.begin().await?;
    let pending = PhoneVerification::take(&mut tx, &phone)
        .await?
        .filter(|pending| pending.user_id == auth.user_id)
        .ok_or_else(|| ApiError::BadRequest("No pending verification for this number".to_string()))?;

    if pending.is_expired(Utc::now()) {
        tx.commit().await?;
        return Err(ApiError::BadRequest("Verification code expired".to_string()));
    }
    if !tokens::constant_time_eq(req.code.trim(), &pending.code) {
        return Err(ApiError::BadRequest("Incorrect verification code".to_string()));
    }

    User::set_verified_phone(&mut tx, auth.user_id, &phone).await?;
    tx.commit().await?;

    tracing::info!(user_id = %auth.user_id, phone = %mask_phone(&phone), "Phone verified");

    Ok(Json(current_user(&state, &auth).await?))
}
