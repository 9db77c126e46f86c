//! Service root.

use axum::{http::StatusCode, response::IntoResponse};

/// Plain liveness probe for load balancers; `/health` is the real check.
pub async fn root() -> impl IntoResponse {
    (StatusCode::OK, crate::APP_USER_AGENT)
}
