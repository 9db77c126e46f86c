//! HTTP surface: router construction and server startup.

use anyhow::{Context, Result};
use axum::{
    Extension,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;

pub mod handlers;
mod openapi;

pub use openapi::ApiDoc;

use crate::identity::PgIdentityBinder;
use crate::session::{
    PgSessionStore, SessionConfig, SessionEngine, SessionStore, spawn_session_sweeper,
};
use crate::token::TokenCodec;
use handlers::auth::AuthState;

/// Start the server.
///
/// # Errors
///
/// Returns an error if the signing key is unusable, the database is
/// unreachable, or the listener cannot bind.
pub async fn new(
    port: u16,
    dsn: String,
    token_key: &SecretString,
    session_config: SessionConfig,
    sweep_interval_seconds: u64,
) -> Result<()> {
    // Key misconfiguration is fatal at startup, never per request.
    let codec = TokenCodec::new(token_key.expose_secret().as_bytes())
        .context("Invalid token signing key")?;

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool.clone()));

    // The sweep keeps storage tidy; no request depends on it.
    spawn_session_sweeper(
        store.clone(),
        Duration::from_secs(sweep_interval_seconds),
        session_config.refresh_ttl_seconds(),
    );

    let engine = SessionEngine::new(store, codec, session_config);
    let auth_state = Arc::new(AuthState::new(
        engine,
        Arc::new(PgIdentityBinder::new(pool.clone())),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let app = axum::Router::new()
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::health::health))
        .route("/openapi.json", get(openapi::serve))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/refresh", post(handlers::auth::refresh))
        .route("/v1/auth/logout", post(handlers::auth::logout))
        .route("/v1/auth/me", get(handlers::auth::me))
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
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
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
