//! # Turnstile (Access-Control Front Door)
//!
//! `turnstile` decides, for every request reaching an HTTP resource API, whether
//! the request may proceed, as whom, and at what rate.
//!
//! ## Pipeline
//!
//! Requests pass three gates in a fixed order and any gate may end the request:
//!
//! 1. **Rate limiting:** a per-client token bucket keyed by peer address. Idle
//!    clients are evicted by a background janitor so the table stays bounded.
//! 2. **Authentication:** an optional `Authorization: Bearer <token>` header is
//!    resolved to a user through the token store. A missing header yields an
//!    anonymous identity; every form of bad credential yields the same
//!    `invalid_authentication_token` failure.
//! 3. **Authorization:** route-level guards require an authenticated identity,
//!    an activated account, or a specific permission code such as `movies:read`.
//!
//! ## Tokens
//!
//! Tokens are random, URL-safe strings handed out once. Only their SHA-256 hash
//! is persisted, together with an expiry and a scope (`authentication` or
//! `activation`). Expired, unknown and wrong-scope tokens are indistinguishable
//! to callers.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
