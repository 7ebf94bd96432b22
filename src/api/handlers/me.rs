//! Current identity endpoint.
//!
//! Requires an activated account and returns the account together with the
//! permission codes granted to it, loaded fresh for this request.

use axum::{Json, extract::Extension, response::IntoResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use super::auth::{AccessError, AuthState, ErrorBody, Identity, User, guards::ensure_activated};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user: User,
    pub permissions: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user and their permission codes.", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorBody),
        (status = 403, description = "Account not activated.", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn get_me(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, AccessError> {
    let user = ensure_activated(&identity)?;

    let permissions = state
        .permissions()
        .permissions_for_user(user.id)
        .await
        .map_err(|err| AccessError::store_unavailable("permission lookup", &err))?;

    Ok(Json(MeResponse {
        user: user.clone(),
        permissions: permissions.codes(),
    }))
}
