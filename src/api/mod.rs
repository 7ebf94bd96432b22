use crate::api::handlers::auth::{
    self, AuthConfig, AuthState, ClientRateLimiter, MemoryStore, PgStore, RateLimitConfig,
};
use anyhow::{Context, Result};
use crate::api::metrics::HttpMetrics;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;
use url::Url;

pub mod handlers;
pub mod metrics;
mod openapi;

pub use openapi::openapi;

/// Build the application router with the full access pipeline applied.
///
/// Layers run outermost first: request metrics, request id, tracing, panic
/// recovery, CORS, rate limiting, authentication. Serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the rate limiter
/// can see peer addresses.
#[must_use]
pub fn router(state: Arc<AuthState>) -> Router {
    let (router, _openapi) = openapi::api_router().split_for_parts();

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::PUT])
        .allow_origin(Any);

    let metrics = Arc::new(HttpMetrics::new());

    router
        .layer(Extension(state.clone()))
        .layer(Extension(metrics.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::authenticate,
        ))
        .layer(middleware::from_fn_with_state(state, auth::limit_requests))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(CatchPanicLayer::new())
                .layer(cors),
        )
        .layer(middleware::from_fn_with_state(metrics, metrics::track))
}

/// Start the server
/// # Errors
/// Return error if the configuration is invalid, the database is unreachable,
/// or the listener cannot be bound.
pub async fn new(
    port: u16,
    dsn: Option<String>,
    auth_config: AuthConfig,
    rate_limit_config: RateLimitConfig,
) -> Result<()> {
    let limiter = Arc::new(
        ClientRateLimiter::new(rate_limit_config).context("Invalid rate limiter configuration")?,
    );

    let state = match dsn {
        Some(dsn) => {
            let pool = connect(&dsn).await?;
            AuthState::new(auth_config, Arc::new(PgStore::new(pool)), limiter.clone())
        }
        None => {
            warn!("No DSN configured, using the in-memory store; tokens and users are lost on restart");
            AuthState::new(auth_config, Arc::new(MemoryStore::default()), limiter.clone())
        }
    }
    .context("Invalid token configuration")?;

    let janitor = if limiter.config().enabled() {
        Some(limiter.start_janitor())
    } else {
        info!("Rate limiting disabled");
        None
    };

    let app = router(Arc::new(state));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(janitor) = janitor {
        janitor.stop().await;
    }

    info!("Gracefully shutdown");

    Ok(())
}

/// Connect to Postgres.
/// # Errors
/// Returns an error if the DSN is invalid or the database is unreachable.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    let url = Url::parse(dsn).context("Invalid DSN")?;
    info!(
        "Connecting to database at {}",
        url.host_str().unwrap_or("localhost")
    );

    PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
