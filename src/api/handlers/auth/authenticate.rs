//! Request-level middleware: rate limiting, then bearer-token authentication.
//!
//! Flow Overview:
//! 1) `limit_requests` derives the client key and consumes one token from its bucket.
//!    A disabled limiter is skipped before any key derivation.
//! 2) `authenticate` resolves an optional `Authorization: Bearer` header to an
//!    [`Identity`] and stores it in the request extensions for guards and handlers.
//! 3) Every response that passed the authenticator varies on `Authorization`.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::VARY},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::AccessError;
use super::identity::{Identity, TokenScope};
use super::rate_limit::RateLimitDecision;
use super::state::AuthState;
use super::utils::{Credential, bearer_credential, client_key};

/// Reject clients over quota before any identity work happens.
///
/// # Errors
/// Returns [`AccessError::Throttled`] when the client's bucket is empty and
/// [`AccessError::ConfigurationFault`] when no client key can be derived.
pub async fn limit_requests(
    State(state): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Result<Response, AccessError> {
    let limiter = state.rate_limiter();
    if !limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let Some(key) = client_key(&request, state.config().trust_proxy_headers()) else {
        return Err(AccessError::ConfigurationFault(
            "no client address available for rate limiting; serve with connect info",
        ));
    };

    match limiter.check(&key) {
        RateLimitDecision::Allowed => Ok(next.run(request).await),
        RateLimitDecision::Limited { retry_after } => {
            debug!(client = %key, ?retry_after, "rate limit exceeded");
            Err(AccessError::Throttled { retry_after })
        }
    }
}

/// Resolve the request's identity.
///
/// Missing credentials yield [`Identity::Anonymous`]. A malformed header, a
/// token of the wrong shape, and a token the store cannot resolve all yield the
/// same [`AccessError::AuthenticationFailed`].
pub async fn authenticate(
    State(state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = resolve_identity(&state, request.headers()).await;
    let mut response = match resolved {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };

    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve_identity(state: &AuthState, headers: &HeaderMap) -> Result<Identity, AccessError> {
    let token = match bearer_credential(headers) {
        Credential::Missing => return Ok(Identity::Anonymous),
        Credential::Malformed => {
            debug!("rejecting malformed authorization header");
            return Err(AccessError::AuthenticationFailed);
        }
        Credential::Bearer(token) => token,
    };

    let tokens = state.tokens();
    if !tokens.codec().is_well_formed(token) {
        debug!("rejecting bearer token with invalid shape");
        return Err(AccessError::AuthenticationFailed);
    }

    match tokens.user_for_token(TokenScope::Authentication, token).await {
        Ok(Some(user)) => Ok(Identity::Authenticated(user)),
        Ok(None) => {
            warn!("rejecting unknown, expired or wrong-scope bearer token");
            Err(AccessError::AuthenticationFailed)
        }
        Err(err) => Err(AccessError::store_unavailable("token lookup", &err)),
    }
}
