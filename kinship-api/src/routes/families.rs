/// Family endpoints
///
/// - `GET  /v1/families` - Families the caller has ever joined
/// - `POST /v1/families` - Create a family (caller becomes a member, root group provisioned)
/// - `POST /v1/families/:id/switch` - Make a previously joined family active
/// - `GET  /v1/family` - Active family with its root group
/// - `GET  /v1/family/members` - Members of the active family
/// - `POST /v1/family/invite-code` - Rotate the family code (admin)
/// - `POST /v1/invites/redeem` - Join a family or group by code

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
    auth::{
        authorization::{require_active_family, require_family_admin},
        middleware::AuthContext,
    },
    context::ActiveContext,
    invite::{self, Redemption},
    models::{
        family::Family,
        group::Group,
        membership::{FamilyMembership, MembershipWithFamily},
        user::{MemberSummary, User},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFamilyRequest {
    #[validate(length(min = 1, max = 100, message = "Family name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct FamilyResponse {
    pub family: Family,

    pub root_group: Group,
}

#[derive(Debug, Serialize)]
pub struct MyFamiliesResponse {
    pub active_family_id: Option<Uuid>,

    pub families: Vec<MembershipWithFamily>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub context: ActiveContext,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

pub async fn list_my_families(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<MyFamiliesResponse>> {
    let families = FamilyMembership::list_for_user(&state.db, auth.user_id).await?;

    Ok(Json(MyFamiliesResponse {
        active_family_id: auth.family_id,
        families,
    }))
}

/// Create a family
///
/// The caller's active context switches to the new family and the root
/// group named after it is created in the same transaction.
pub async fn create_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateFamilyRequest>,
) -> ApiResult<(StatusCode, Json<FamilyResponse>)> {
    req.validate()?;

    let (family, root_group) =
        invite::create_family(&state.db, auth.user_id, req.name.trim()).await?;

    Ok((
        StatusCode::CREATED,
        Json(FamilyResponse { family, root_group }),
    ))
}

/// Switch the active family
///
/// Only families the caller has joined before are eligible; anything else is
/// reported as not found. The active group is cleared.
pub async fn switch_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(family_id): Path<Uuid>,
) -> ApiResult<Json<ContextResponse>> {
    if !FamilyMembership::is_member(&state.db, family_id, auth.user_id).await? {
        return Err(ApiError::NotFound("Family not found".to_string()));
    }

    let context = auth.active_context().switch_family(family_id);
    let mut conn = state.db.acquire().await?;
    User::set_context(&mut conn, auth.user_id, context).await?;

    tracing::info!(user_id = %auth.user_id, family_id = %family_id, "Switched active family");

    Ok(Json(ContextResponse { context }))
}

/// Active family and its root group, provisioning the root on first access
pub async fn current_family(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<FamilyResponse>> {
    let family_id = require_active_family(&auth)?;

    let family = Family::find_by_id(&state.db, family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Family not found".to_string()))?;
    let root_group = Group::ensure_root(&state.db, &family).await?;

    Ok(Json(FamilyResponse { family, root_group }))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<MemberSummary>>> {
    let family_id = require_active_family(&auth)?;
    Ok(Json(User::list_by_family(&state.db, family_id).await?))
}

/// Replace the active family's invite code (admin only)
pub async fn rotate_family_code(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Family>> {
    let family_id = require_active_family(&auth)?;
    require_family_admin(&auth, family_id)?;

    let family = invite::rotate_family_code(&state.db, family_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Family not found".to_string()))?;

    tracing::info!(family_id = %family_id, rotated_by = %auth.user_id, "Family invite code rotated");

    Ok(Json(family))
}

/// Redeem a family or group invite code
///
/// # Endpoint
///
/// ```text
/// POST /v1/invites/redeem
///
/// { "code": "k7mq2xpa" }
/// ```
///
/// Codes are matched case-insensitively. The response names what was
/// joined and the caller's new active context.
///
/// # Errors
///
/// - `404 Not Found`: no family or group carries the code
pub async fn redeem_code(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<RedeemRequest>,
) -> ApiResult<Json<Redemption>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    Ok(Json(invite::redeem(&state.db, &user, &req.code).await?))
}
