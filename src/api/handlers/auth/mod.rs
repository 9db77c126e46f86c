//! Session endpoints: login, refresh, logout, and subject lookup.
//!
//! These handlers are thin adapters over the lifecycle engine. Every typed
//! engine outcome maps to one status code here; `Invalid`, `Fraud`, and
//! `NotFound` all collapse into a uniform 401 so a caller probing session
//! state cannot tell a destroyed session from an expired credential. The
//! distinction survives in the logs.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::identity::{BindError, Identity};
use crate::session::AuthError;

pub mod state;
pub mod types;
mod utils;

#[cfg(test)]
mod tests;

pub use state::AuthState;

use types::{LoginRequest, MeResponse, TokenResponse};
use utils::{extract_bearer_token, normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "Session opened", body = TokenResponse),
        (status = 409, description = "Email bound to a different identity"),
        (status = 422, description = "Malformed identity payload"),
        (status = 429, description = "Concurrent session limit reached")
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> impl IntoResponse {
    let email = normalize_email(&request.email);
    if !valid_email(&email) || request.external_id.trim().is_empty() {
        return StatusCode::UNPROCESSABLE_ENTITY.into_response();
    }

    let identity = Identity {
        external_id: request.external_id,
        email,
        display_name: request.display_name,
    };
    let user = match auth_state.identity().resolve(&identity).await {
        Ok(user) => user,
        Err(BindError::CredentialsTaken) => return StatusCode::CONFLICT.into_response(),
        Err(BindError::Fatal(err)) => {
            error!("Failed to bind identity: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match auth_state.engine().login(user.id).await {
        Ok(pair) => (
            StatusCode::CREATED,
            Json(TokenResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            }),
        )
            .into_response(),
        Err(AuthError::LimitExceeded) => {
            warn!(user_id = %user.id, "login refused, session limit reached");
            StatusCode::TOO_MANY_REQUESTS.into_response()
        }
        Err(AuthError::Fatal(err)) => {
            error!("Failed to open session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            error!("Unexpected login outcome: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 201, description = "Session rotated", body = TokenResponse),
        (status = 401, description = "Refresh token rejected")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    // Read-only pre-flight gate; rate-limits rotation before anything is
    // mutated.
    match auth_state.engine().verify_refresh(&token).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("refresh rejected by pre-flight gate");
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Err(AuthError::Fatal(err)) => {
            error!("Failed to pre-check refresh token: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    }

    match auth_state.engine().refresh(&token).await {
        Ok(pair) => (
            StatusCode::CREATED,
            Json(TokenResponse {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            }),
        )
            .into_response(),
        Err(AuthError::Fatal(err)) => {
            error!("Failed to rotate session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(err) => {
            // Fraud, NotFound, and Invalid deliberately share one status.
            warn!("refresh rejected: {err}");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared"),
        (status = 401, description = "Access token rejected")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match auth_state.engine().logout_by_access(&token).await {
        // Absent sessions are fine; logout is idempotent.
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(AuthError::Fatal(err)) => {
            error!("Failed to delete session: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses(
        (status = 200, description = "Active session subject", body = MeResponse),
        (status = 401, description = "Access token rejected"),
        (status = 404, description = "User record is gone")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let subject_id = match auth_state.engine().verify_access(&token).await {
        Ok(subject_id) => subject_id,
        Err(AuthError::Fatal(err)) => {
            error!("Failed to verify access token: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    match auth_state.identity().get(subject_id).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(MeResponse {
                id: user.id.to_string(),
                external_id: user.external_id,
                email: user.email,
                display_name: user.display_name,
                created_at_unix: user.created_at_unix,
                updated_at_unix: user.updated_at_unix,
            }),
        )
            .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch user: {err:#}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
