//! Outcomes that end a request inside the access pipeline.
//!
//! Throttling, authentication and authorization failures carry a stable reason
//! code in the body. Infrastructure failures are logged here and answered with a
//! generic `server_error` so nothing internal reaches the client.

use axum::{
    Json,
    http::{
        HeaderValue, StatusCode,
        header::{RETRY_AFTER, WWW_AUTHENTICATE},
    },
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;
use utoipa::ToSchema;

/// JSON body of every pipeline rejection.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForbiddenReason {
    AccountInactive,
    PermissionDenied,
}

impl ForbiddenReason {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AccountInactive => "account_inactive",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The pipeline is wired or deployed wrongly, e.g. no peer address is
    /// available to key the rate limiter on.
    #[error("configuration fault: {0}")]
    ConfigurationFault(&'static str),
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    Throttled { retry_after: Duration },
    #[error("invalid or missing authentication token")]
    AuthenticationFailed,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("forbidden: {}", .0.code())]
    Forbidden(ForbiddenReason),
    #[error("store unavailable")]
    StoreUnavailable,
}

impl AccessError {
    /// Log a store failure and collapse it into [`AccessError::StoreUnavailable`].
    pub fn store_unavailable(operation: &str, err: &anyhow::Error) -> Self {
        error!("Store failure during {operation}: {err:#}");
        Self::StoreUnavailable
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::ConfigurationFault(_) | Self::StoreUnavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AuthenticationFailed | Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationFault(_) | Self::StoreUnavailable => "server_error",
            Self::Throttled { .. } => "rate_limit_exceeded",
            Self::AuthenticationFailed => "invalid_authentication_token",
            Self::AuthenticationRequired => "authentication_required",
            Self::Forbidden(reason) => reason.code(),
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::ConfigurationFault(_) | Self::StoreUnavailable => {
                "the server encountered a problem and could not process your request"
            }
            Self::Throttled { .. } => "rate limit exceeded",
            Self::AuthenticationFailed => "invalid or missing authentication token",
            Self::AuthenticationRequired => {
                "you must be authenticated to access this resource"
            }
            Self::Forbidden(ForbiddenReason::AccountInactive) => {
                "your user account must be activated to access this resource"
            }
            Self::Forbidden(ForbiddenReason::PermissionDenied) => {
                "your user account doesn't have the necessary permissions to access this resource"
            }
        }
    }
}

/// Whole seconds for `Retry-After`, never less than one.
fn retry_after_seconds(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs_f64().ceil();
    if secs < 1.0 { 1 } else { secs as u64 }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        if let Self::ConfigurationFault(detail) = &self {
            error!("Access pipeline misconfigured: {detail}");
        }

        let body = Json(ErrorBody::new(self.code(), self.message()));
        let mut response = (self.status(), body).into_response();

        match self {
            Self::Throttled { retry_after } => {
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_seconds(retry_after)));
            }
            Self::AuthenticationFailed => {
                response
                    .headers_mut()
                    .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }

        response
    }
}
