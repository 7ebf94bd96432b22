//! API handlers for Turnstile.
//!
//! `auth` holds the access pipeline itself; the remaining modules are the few
//! endpoints the pipeline serves on its own behalf.

pub mod auth;
pub mod health;
pub mod me;
pub mod users;
