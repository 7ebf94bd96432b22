//! User activation.
//!
//! Flow Overview:
//! 1) Validate the activation token's shape and resolve it under the `activation` scope.
//! 2) Mark the user activated with a version-checked update.
//! 3) Revoke every outstanding activation token for that user.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use super::auth::{ActivationOutcome, AuthState, ErrorBody, TokenScope, User};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ActivateUserRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ActivateUserResponse {
    pub user: User,
}

#[derive(Debug)]
pub enum ActivationError {
    InvalidToken,
    EditConflict,
    Store,
}

impl IntoResponse for ActivationError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::InvalidToken => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorBody::new("invalid_token", "invalid or expired activation token"),
            ),
            Self::EditConflict => (
                StatusCode::CONFLICT,
                ErrorBody::new(
                    "edit_conflict",
                    "unable to update the record due to an edit conflict, please try again",
                ),
            ),
            Self::Store => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody::new(
                    "server_error",
                    "the server encountered a problem and could not process your request",
                ),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[utoipa::path(
    put,
    path = "/v1/users/activated",
    request_body = ActivateUserRequest,
    responses(
        (status = 200, description = "User activated.", body = ActivateUserResponse),
        (status = 409, description = "User was modified concurrently.", body = ErrorBody),
        (status = 422, description = "Invalid or expired activation token.", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn activate_user(
    Extension(state): Extension<Arc<AuthState>>,
    Json(request): Json<ActivateUserRequest>,
) -> Result<Json<ActivateUserResponse>, ActivationError> {
    let tokens = state.tokens();
    if !tokens.codec().is_well_formed(&request.token) {
        return Err(ActivationError::InvalidToken);
    }

    let user = tokens
        .user_for_token(TokenScope::Activation, &request.token)
        .await
        .map_err(|err| {
            error!("Failed to look up activation token: {err:#}");
            ActivationError::Store
        })?
        .ok_or(ActivationError::InvalidToken)?;

    let user = match state.users().activate(&user).await {
        Ok(ActivationOutcome::Activated(user)) => user,
        Ok(ActivationOutcome::EditConflict) => return Err(ActivationError::EditConflict),
        Err(err) => {
            error!("Failed to activate user: {err:#}");
            return Err(ActivationError::Store);
        }
    };

    if let Err(err) = tokens
        .delete_all_for_user(TokenScope::Activation, user.id)
        .await
    {
        error!("Failed to revoke activation tokens: {err:#}");
        return Err(ActivationError::Store);
    }

    info!(user_id = %user.id, "user activated");

    Ok(Json(ActivateUserResponse { user }))
}
