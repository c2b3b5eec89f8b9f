/// Bearer authentication layer
///
/// Resolves the `Authorization` header into an
/// [`AuthContext`](kinship_shared::auth::middleware::AuthContext) and inserts it
/// into request extensions. Handlers extract it with `Extension<AuthContext>`.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use kinship_shared::auth::middleware::authenticate;

use crate::{app::AppState, error::ApiError};

pub async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = authenticate(&state.db, state.jwt_secret(), req.headers()).await?;

    tracing::trace!(user_id = %auth.user_id, "Authenticated request");
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
