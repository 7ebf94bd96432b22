//! Request metadata helpers for the access pipeline.

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, Request, header::AUTHORIZATION},
};
use std::net::SocketAddr;

/// Client address from proxy headers: first `X-Forwarded-For` hop, then `X-Real-IP`.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let trimmed = first.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Stable per-client key used by the rate limiter. The peer address comes from
/// `ConnectInfo`; proxy headers are consulted first only when trusted.
pub(crate) fn client_key<B>(request: &Request<B>, trust_proxy_headers: bool) -> Option<String> {
    if trust_proxy_headers && let Some(ip) = extract_client_ip(request.headers()) {
        return Some(ip);
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Outcome of reading the `Authorization` header.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Credential<'a> {
    Missing,
    Bearer(&'a str),
    Malformed,
}

/// Parse `Authorization: Bearer <token>`. The scheme is case-insensitive; any
/// other shape, including extra segments or non-UTF-8 bytes, is malformed.
pub(crate) fn bearer_credential(headers: &HeaderMap) -> Credential<'_> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Credential::Missing;
    };
    let Ok(value) = value.to_str() else {
        return Credential::Malformed;
    };

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None)
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() =>
        {
            Credential::Bearer(token)
        }
        _ => Credential::Malformed,
    }
}
