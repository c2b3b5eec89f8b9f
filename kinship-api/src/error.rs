/// Error handling for the API server
///
/// Every handler returns `ApiResult<T>`; library errors convert into
/// [`ApiError`] through the `From` impls below, which decide the status code.
///
/// # Example
///
/// ```
/// use kinship_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(found: bool) -> ApiResult<Json<serde_json::Value>> {
///     if !found {
///         return Err(ApiError::NotFound("Event not found".to_string()));
///     }
///     Ok(Json(json!({ "ok": true })))
/// }
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kinship_shared::{
    auth::{
        authorization::AuthzError, feed_token::FeedTokenError, jwt::JwtError,
        middleware::AuthError, password::PasswordError,
    },
    context::ContextError,
    hierarchy::HierarchyError,
    holidays::HolidayError,
    invite::InviteError,
    models::group::ReparentError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409), e.g. a taken handle
    Conflict(String),

    /// Unprocessable entity (422)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Bad gateway (502): an upstream API failed
    UpstreamFailure(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,

    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. "not_found"
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::UpstreamFailure(msg) => write!(f, "Upstream failure: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (error_code, message, details) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg, None),
            ApiError::Unauthorized(msg) => ("unauthorized", msg, None),
            ApiError::Forbidden(msg) => ("forbidden", msg, None),
            ApiError::NotFound(msg) => ("not_found", msg, None),
            ApiError::Conflict(msg) => ("conflict", msg, None),
            ApiError::ValidationError(errors) => (
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::UpstreamFailure(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (
                    "upstream_failure",
                    "An upstream service failed, nothing was changed".to_string(),
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                // Details stay in the log
                tracing::error!("Internal error: {}", msg);
                (
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg, None),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Client-facing message for a violated unique index or constraint
fn conflict_message(constraint: &str) -> String {
    match constraint {
        "users_handle_key" => "Handle already taken".to_string(),
        "users_email_key" => "Email already in use".to_string(),
        "users_phone_key" => "Phone number already in use".to_string(),
        "groups_family_nickname_key" => {
            "A group with this nickname already exists in the family".to_string()
        }
        "families_invite_code_key" | "groups_invite_code_key" => {
            "Invite code collision, please retry".to_string()
        }
        "events_family_holiday_key" => "Holiday already on the calendar".to_string(),
        other => format!("Constraint violation: {}", other),
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let message = db_err
                        .constraint()
                        .map(conflict_message)
                        .unwrap_or_else(|| "Resource already exists".to_string());
                    return ApiError::Conflict(message);
                }
                if db_err.is_check_violation() {
                    return match db_err.constraint() {
                        Some("events_end_after_start") => {
                            ApiError::BadRequest("Event must not end before it starts".to_string())
                        }
                        Some("groups_parent_not_self") => {
                            ApiError::BadRequest("A group cannot be its own parent".to_string())
                        }
                        _ => ApiError::BadRequest("Invalid value".to_string()),
                    };
                }
                if db_err.is_foreign_key_violation() {
                    return ApiError::BadRequest("Referenced resource does not exist".to_string());
                }

                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is busy, try again".to_string())
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<ValidationErrorDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(details)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing credentials".to_string())
            }
            AuthError::InvalidFormat(msg) => ApiError::Unauthorized(msg.to_string()),
            AuthError::InvalidToken(err) => err.into(),
            AuthError::UnknownUser => ApiError::Unauthorized("Account no longer exists".to_string()),
            AuthError::PendingApproval => {
                ApiError::Forbidden("Account is awaiting admin approval".to_string())
            }
            AuthError::Database(err) => err.into(),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::NoActiveFamily => ApiError::BadRequest(err.to_string()),
            AuthzError::AdminRequired | AuthzError::NotHost => ApiError::Forbidden(err.to_string()),
            AuthzError::OutsideFamily(_) => ApiError::NotFound("Resource not found".to_string()),
            AuthzError::ForeignCohost => ApiError::BadRequest(err.to_string()),
            AuthzError::DatabaseError(err) => err.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooWeak(message) => ApiError::invalid_field("password", message),
            _ => ApiError::InternalError(format!("Password operation failed: {}", err)),
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

impl From<InviteError> for ApiError {
    fn from(err: InviteError) -> Self {
        match err {
            InviteError::UnknownCode => ApiError::NotFound("Invite code not found".to_string()),
            InviteError::ExhaustedCodeSpace { .. } => ApiError::ServiceUnavailable(
                "Could not allocate an invite code, try again".to_string(),
            ),
            InviteError::Database(err) => err.into(),
        }
    }
}

impl From<HierarchyError> for ApiError {
    fn from(err: HierarchyError) -> Self {
        match err {
            HierarchyError::UnknownGroup(_) => ApiError::NotFound("Group not found".to_string()),
            HierarchyError::CyclicHierarchy(id) => {
                ApiError::InternalError(format!("Group hierarchy is cyclic at {}", id))
            }
        }
    }
}

impl From<ReparentError> for ApiError {
    fn from(err: ReparentError) -> Self {
        match err {
            ReparentError::GroupNotFound | ReparentError::ParentNotFound => {
                ApiError::NotFound(err.to_string())
            }
            ReparentError::RootImmovable | ReparentError::WouldCreateCycle => {
                ApiError::BadRequest(err.to_string())
            }
            ReparentError::Hierarchy(err) => err.into(),
            ReparentError::Database(err) => err.into(),
        }
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<HolidayError> for ApiError {
    fn from(err: HolidayError) -> Self {
        match err {
            HolidayError::NotConfigured => {
                ApiError::ServiceUnavailable("Holiday import is not configured".to_string())
            }
            _ => ApiError::UpstreamFailure(err.to_string()),
        }
    }
}

impl From<FeedTokenError> for ApiError {
    fn from(_: FeedTokenError) -> Self {
        ApiError::NotFound("Calendar feed not found".to_string())
    }
}
