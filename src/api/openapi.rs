//! OpenAPI document for the service, served at `/openapi.json`.

use axum::response::Json;
use utoipa::OpenApi;

use super::handlers::{auth, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "questgate",
        description = "Session and token service for the quest platform"
    ),
    paths(
        auth::login,
        auth::refresh,
        auth::logout,
        auth::me,
        health::health
    ),
    components(schemas(
        auth::types::LoginRequest,
        auth::types::TokenResponse,
        auth::types::MeResponse,
        health::Health
    )),
    tags(
        (name = "auth", description = "Session lifecycle endpoints"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

pub async fn serve() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_all_session_routes() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for route in [
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/me",
            "/health",
        ] {
            assert!(paths.contains_key(route), "missing route: {route}");
        }
    }
}
