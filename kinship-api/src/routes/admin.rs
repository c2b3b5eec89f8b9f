/// Admin endpoints
///
/// - `GET  /v1/admin/pending` - Accounts awaiting approval
/// - `POST /v1/admin/users/:id/approve` - Approve a pending account
/// - `POST /v1/admin/users/:id/deny` - Delete a pending account
/// - `PUT  /v1/admin/users/:id/role` - Change a user's role
///
/// Every handler requires the `admin` role.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use kinship_shared::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::user::{User, UserRole},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

pub async fn list_pending(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<User>>> {
    require_admin(&auth)?;
    Ok(Json(User::list_pending(&state.db).await?))
}

pub async fn approve_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    require_admin(&auth)?;

    let user = User::approve(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, approved_by = %auth.user_id, "User approved");

    Ok(Json(user))
}

/// Deny a signup; only accounts still pending can be removed this way
pub async fn deny_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_admin(&auth)?;

    if !User::delete_pending(&state.db, user_id).await? {
        return Err(ApiError::NotFound("Pending user not found".to_string()));
    }

    tracing::info!(user_id = %user_id, denied_by = %auth.user_id, "Pending user denied");

    Ok(StatusCode::NO_CONTENT)
}

/// Change a user's role; admins cannot demote themselves
pub async fn set_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<User>> {
    require_admin(&auth)?;

    if user_id == auth.user_id && !req.role.is_admin() {
        return Err(ApiError::BadRequest(
            "Admins cannot remove their own admin role".to_string(),
        ));
    }

    let user = User::set_role(&state.db, user_id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, role = user.role.as_str(), changed_by = %auth.user_id, "Role changed");

    Ok(Json(user))
}
