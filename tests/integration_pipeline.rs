#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use std::{net::SocketAddr, sync::Arc};
use tower::ServiceExt;
use turnstile::api::{
    self,
    handlers::auth::{
        AuthConfig, AuthState, ClientRateLimiter, MemoryStore, Permission, PermissionStore,
        RateLimitConfig, TokenScope, User,
    },
};
use uuid::Uuid;

struct Harness {
    app: Router,
    state: Arc<AuthState>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::default());
    let limiter = Arc::new(
        ClientRateLimiter::new(RateLimitConfig::new().with_burst(100)).expect("valid limiter"),
    );
    let state = Arc::new(
        AuthState::new(AuthConfig::new(), store.clone(), limiter).expect("valid auth config"),
    );
    Harness {
        app: api::router(state.clone()),
        state,
        store,
    }
}

fn new_user(activated: bool) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Robin".to_string(),
        email: "robin@example.com".to_string(),
        activated,
        version: 1,
    }
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from(([198, 51, 100, 20], 51_000))));
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn issue(state: &AuthState, user_id: Uuid, scope: TokenScope) -> Result<String> {
    let issued = state
        .tokens()
        .issue(user_id, state.config().token_ttl(scope), scope)
        .await?;
    Ok(issued.plaintext.expose_secret().to_string())
}

#[tokio::test]
async fn health_is_public_and_tagged_with_request_id() -> Result<()> {
    let harness = harness();

    let response = harness
        .app
        .oneshot(request(Method::GET, "/health", None, None))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get(header::VARY).map(|v| v.as_bytes()),
        Some(b"Authorization".as_slice())
    );
    let body = json_body(response).await?;
    assert_eq!(body["store"], "ok");
    Ok(())
}

#[tokio::test]
async fn me_requires_an_activated_account() -> Result<()> {
    let harness = harness();
    let pending = new_user(false);
    harness.store.insert_user(pending.clone());
    let token = issue(&harness.state, pending.id, TokenScope::Authentication).await?;

    let response = harness
        .app
        .clone()
        .oneshot(request(Method::GET, "/v1/me", None, None))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["error"], "authentication_required");

    let response = harness
        .app
        .oneshot(request(Method::GET, "/v1/me", Some(&token), None))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await?["error"], "account_inactive");
    Ok(())
}

#[tokio::test]
async fn me_lists_current_permissions() -> Result<()> {
    let harness = harness();
    let robin = new_user(true);
    harness.store.insert_user(robin.clone());
    harness
        .store
        .add_for_user(robin.id, &[Permission::MoviesRead])
        .await?;
    let token = issue(&harness.state, robin.id, TokenScope::Authentication).await?;

    let response = harness
        .app
        .oneshot(request(Method::GET, "/v1/me", Some(&token), None))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["user"]["id"], robin.id.to_string());
    assert_eq!(body["permissions"], json!(["movies:read"]));
    Ok(())
}

#[tokio::test]
async fn activation_flow_revokes_activation_tokens() -> Result<()> {
    let harness = harness();
    let robin = new_user(false);
    harness.store.insert_user(robin.clone());
    let first = issue(&harness.state, robin.id, TokenScope::Activation).await?;
    let second = issue(&harness.state, robin.id, TokenScope::Activation).await?;
    let session = issue(&harness.state, robin.id, TokenScope::Authentication).await?;

    let response = harness
        .app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": first })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["user"]["activated"], true);
    assert_eq!(body["user"]["version"], 2);

    // Every outstanding activation token is gone, not just the one used.
    let response = harness
        .app
        .clone()
        .oneshot(request(
            Method::PUT,
            "/v1/users/activated",
            None,
            Some(json!({ "token": second })),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await?["error"], "invalid_token");

    // Authentication tokens survive activation and now pass the guard.
    let response = harness
        .app
        .oneshot(request(Method::GET, "/v1/me", Some(&session), None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn activation_rejects_authentication_tokens() -> Result<()> {
    let harness = harness();
    let robin = new_user(false);
    harness.store.insert_user(robin.clone());
    let session = issue(&harness.state, robin.id, TokenScope::Authentication).await?;

    for token in [session.as_str(), "too-short"] {
        let response = harness
            .app
            .clone()
            .oneshot(request(
                Method::PUT,
                "/v1/users/activated",
                None,
                Some(json!({ "token": token })),
            ))
            .await?;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    assert_eq!(harness.store.user(robin.id).map(|u| u.activated), Some(false));
    Ok(())
}

#[tokio::test]
async fn debug_vars_counts_rejected_requests() -> Result<()> {
    let harness = harness();

    let response = harness
        .app
        .clone()
        .oneshot(request(Method::GET, "/health", None, None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = harness
        .app
        .clone()
        .oneshot(request(Method::GET, "/v1/me", Some("not-a-token"), None))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness
        .app
        .oneshot(request(Method::GET, "/debug/vars", None, None))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["total_requests_received"], 3);
    assert_eq!(body["total_responses_sent"], 2);
    assert!(body["total_processing_time_us"].is_u64());
    Ok(())
}
