//! Access pipeline: rate limiting, bearer-token authentication and authorization guards.
//!
//! Flow Overview:
//! 1) `limit_requests` throttles per client before any identity work.
//! 2) `authenticate` attaches an [`Identity`] to every request that gets past the limiter.
//! 3) Route guards in [`guards`] decide whether that identity may reach the handler.
//!
//! Tokens and permissions are read through the [`storage`] traits, backed by
//! Postgres ([`PgStore`]) or an in-process store ([`MemoryStore`]).

mod authenticate;
pub mod error;
pub mod guards;
pub mod identity;
pub mod memory;
pub mod rate_limit;
mod state;
pub mod storage;
pub mod token;
mod utils;

pub use authenticate::{authenticate, limit_requests};
pub use error::{AccessError, ErrorBody, ForbiddenReason};
pub use guards::{PermissionGuard, require_activated, require_authenticated, require_permission};
pub use identity::{Identity, Permission, PermissionSet, TokenScope, User};
pub use memory::MemoryStore;
pub use rate_limit::{
    ClientRateLimiter, JanitorHandle, NoopRateLimiter, RateLimitConfig, RateLimitDecision,
    RateLimiter,
};
pub use state::{AuthConfig, AuthState};
pub use storage::{ActivationOutcome, PermissionStore, PgStore, Store, TokenStore, UserStore};
pub use token::{IssuedToken, TokenCodec, Tokens};
