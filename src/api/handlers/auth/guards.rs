//! Authorization guards.
//!
//! Guards nest: `require_permission` implies `require_activated`, which implies
//! `require_authenticated`. Each check runs in that order and stops at the first
//! failure, so an anonymous caller always sees `authentication_required` and an
//! inactive account never triggers a permission lookup.
//!
//! The `ensure_*` functions work on an [`Identity`] directly for handlers; the
//! `require_*` functions are `axum::middleware` wrappers for routes.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use super::error::{AccessError, ForbiddenReason};
use super::identity::{Identity, Permission, User};
use super::state::AuthState;
use super::storage::PermissionStore;

/// # Errors
/// Returns [`AccessError::AuthenticationRequired`] for anonymous identities.
pub fn ensure_authenticated(identity: &Identity) -> Result<&User, AccessError> {
    identity.user().ok_or(AccessError::AuthenticationRequired)
}

/// # Errors
/// Fails like [`ensure_authenticated`], then with `account_inactive` when the
/// account has not been activated.
pub fn ensure_activated(identity: &Identity) -> Result<&User, AccessError> {
    let user = ensure_authenticated(identity)?;
    if !user.activated {
        debug!(user_id = %user.id, "rejecting inactive account");
        return Err(AccessError::Forbidden(ForbiddenReason::AccountInactive));
    }
    Ok(user)
}

/// Loads the user's permissions fresh from `store` on every call.
///
/// # Errors
/// Fails like [`ensure_activated`], then with `permission_denied` when the
/// permission is not granted, or `StoreUnavailable` when the lookup fails.
pub async fn ensure_permission<'a>(
    identity: &'a Identity,
    store: &dyn PermissionStore,
    permission: Permission,
) -> Result<&'a User, AccessError> {
    let user = ensure_activated(identity)?;

    let granted = store
        .permissions_for_user(user.id)
        .await
        .map_err(|err| AccessError::store_unavailable("permission lookup", &err))?;

    if !granted.contains(permission) {
        debug!(user_id = %user.id, %permission, "rejecting missing permission");
        return Err(AccessError::Forbidden(ForbiddenReason::PermissionDenied));
    }
    Ok(user)
}

fn identity_of(request: &Request) -> Result<&Identity, AccessError> {
    request
        .extensions()
        .get::<Identity>()
        .ok_or(AccessError::ConfigurationFault(
            "route guard ran without the authenticate middleware",
        ))
}

/// Route middleware: any authenticated identity.
///
/// # Errors
/// See [`ensure_authenticated`].
pub async fn require_authenticated(request: Request, next: Next) -> Result<Response, AccessError> {
    ensure_authenticated(identity_of(&request)?)?;
    Ok(next.run(request).await)
}

/// Route middleware: an authenticated, activated identity.
///
/// # Errors
/// See [`ensure_activated`].
pub async fn require_activated(request: Request, next: Next) -> Result<Response, AccessError> {
    ensure_activated(identity_of(&request)?)?;
    Ok(next.run(request).await)
}

/// State for [`require_permission`]: which permission a route needs.
#[derive(Clone)]
pub struct PermissionGuard {
    state: Arc<AuthState>,
    permission: Permission,
}

impl PermissionGuard {
    #[must_use]
    pub fn new(state: Arc<AuthState>, permission: Permission) -> Self {
        Self { state, permission }
    }
}

/// Route middleware: an activated identity holding the guard's permission.
///
/// ```ignore
/// Router::new().route("/v1/movies", get(list_movies)).route_layer(
///     middleware::from_fn_with_state(
///         PermissionGuard::new(state.clone(), Permission::MoviesRead),
///         require_permission,
///     ),
/// )
/// ```
///
/// # Errors
/// See [`ensure_permission`].
pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let identity = identity_of(&request)?.clone();
    ensure_permission(&identity, guard.state.permissions(), guard.permission).await?;
    Ok(next.run(request).await)
}
