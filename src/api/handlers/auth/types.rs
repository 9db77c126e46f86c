//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Verified identity handed in by the upstream authentication collaborator.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub external_id: String,
    pub email: String,
    pub display_name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub id: String,
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
}
