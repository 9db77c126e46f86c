//! Auth handler tests against the in-memory store and binder.

use super::state::AuthState;
use super::types::{LoginRequest, MeResponse, TokenResponse};
use super::{login, logout, me, refresh};
use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::identity::MemoryIdentityBinder;
use crate::session::{MemorySessionStore, SessionConfig, SessionEngine};
use crate::token::TokenCodec;

const KEY: &[u8] = b"handler-test-signing-key-32-byte";

fn auth_state(config: SessionConfig) -> Arc<AuthState> {
    let store = Arc::new(MemorySessionStore::new());
    let codec = TokenCodec::new(KEY).expect("valid key");
    let engine = SessionEngine::new(store, codec, config);
    Arc::new(AuthState::new(engine, Arc::new(MemoryIdentityBinder::new())))
}

fn rotatable_config() -> SessionConfig {
    SessionConfig::new().with_refresh_not_before_seconds(0)
}

fn login_request(external_id: &str, email: &str) -> LoginRequest {
    LoginRequest {
        external_id: external_id.to_string(),
        email: email.to_string(),
        display_name: "Alice".to_string(),
    }
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).expect("valid header"),
    );
    headers
}

async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .context("failed to read response body")?;
    serde_json::from_slice(&bytes).context("failed to decode response body")
}

async fn do_login(state: &Arc<AuthState>, request: LoginRequest) -> Response {
    login(Extension(state.clone()), Json(request))
        .await
        .into_response()
}

#[tokio::test]
async fn login_issues_a_token_pair() -> Result<()> {
    let state = auth_state(rotatable_config());

    let response = do_login(&state, login_request("google:1", "a@example.com")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let tokens: TokenResponse = body_json(response).await?;
    assert!(state.engine().verify_access(&tokens.access_token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn login_rejects_malformed_identity() {
    let state = auth_state(rotatable_config());

    let response = do_login(&state, login_request("google:1", "not-an-email")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = do_login(&state, login_request("  ", "a@example.com")).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn login_conflicting_email_is_409() {
    let state = auth_state(rotatable_config());

    let response = do_login(&state, login_request("google:1", "a@example.com")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = do_login(&state, login_request("google:2", "a@example.com")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn login_over_the_session_limit_is_429() {
    let state = auth_state(rotatable_config().with_max_sessions_per_subject(Some(1)));

    let response = do_login(&state, login_request("google:1", "a@example.com")).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = do_login(&state, login_request("google:1", "a@example.com")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn refresh_rotates_and_replay_is_rejected() -> Result<()> {
    let state = auth_state(rotatable_config());
    let response = do_login(&state, login_request("google:1", "a@example.com")).await;
    let original: TokenResponse = body_json(response).await?;

    let response = refresh(bearer(&original.refresh_token), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::CREATED);
    let rotated: TokenResponse = body_json(response).await?;
    assert_ne!(rotated.refresh_token, original.refresh_token);

    // Replaying the spent token gets the same opaque 401 as any other
    // rejection, and takes the whole session with it.
    let response = refresh(bearer(&original.refresh_token), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = refresh(bearer(&rotated.refresh_token), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn refresh_without_credentials_is_401() {
    let state = auth_state(rotatable_config());
    let response = refresh(HeaderMap::new(), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = refresh(bearer("garbage"), Extension(state))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_is_gated_by_minimum_rotation_interval() -> Result<()> {
    // Default config keeps the 30 second not-before window.
    let state = auth_state(SessionConfig::new());
    let response = do_login(&state, login_request("google:1", "a@example.com")).await;
    let tokens: TokenResponse = body_json(response).await?;

    let response = refresh(bearer(&tokens.refresh_token), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The token itself is still the latest generation; only the gate fired.
    assert!(state.engine().verify_access(&tokens.access_token).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn logout_is_idempotent_and_invalidates_access() -> Result<()> {
    let state = auth_state(rotatable_config());
    let response = do_login(&state, login_request("google:1", "a@example.com")).await;
    let tokens: TokenResponse = body_json(response).await?;

    let response = logout(bearer(&tokens.access_token), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = logout(bearer(&tokens.access_token), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = me(bearer(&tokens.access_token), Extension(state))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn me_returns_the_bound_profile() -> Result<()> {
    let state = auth_state(rotatable_config());
    let response = do_login(&state, login_request("google:1", "A@Example.com")).await;
    let tokens: TokenResponse = body_json(response).await?;

    let response = me(bearer(&tokens.access_token), Extension(state.clone()))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let profile: MeResponse = body_json(response).await?;
    assert_eq!(profile.email, "a@example.com");
    assert_eq!(profile.external_id, "google:1");

    let response = me(bearer("garbage"), Extension(state))
        .await
        .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
