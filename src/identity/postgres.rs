//! Postgres-backed identity binder.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{BindError, Identity, IdentityBinder, User};

#[derive(Debug, Clone)]
pub struct PgIdentityBinder {
    pool: PgPool,
}

impl PgIdentityBinder {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        external_id: row.get("external_id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        created_at_unix: row.get("created_at_unix"),
        updated_at_unix: row.get("updated_at_unix"),
    }
}

const USER_COLUMNS: &str = r"
    id, external_id, email, display_name,
    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
    EXTRACT(EPOCH FROM updated_at)::BIGINT AS updated_at_unix
";

#[async_trait]
impl IdentityBinder for PgIdentityBinder {
    async fn resolve(&self, identity: &Identity) -> Result<User, BindError> {
        // Upsert keyed by external_id. The email column keeps its own
        // uniqueness constraint, so binding an email that belongs to a
        // different external identity fails with 23505.
        let query = format!(
            r"
            INSERT INTO users (external_id, email, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id) DO UPDATE
            SET email = EXCLUDED.email,
                display_name = EXCLUDED.display_name,
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(&identity.external_id)
            .bind(&identity.email)
            .bind(&identity.display_name)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(user_from_row(&row)),
            Err(err) if is_unique_violation(&err) => Err(BindError::CredentialsTaken),
            Err(err) => Err(BindError::Fatal(
                anyhow::Error::new(err).context("failed to upsert user"),
            )),
        }
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<User>, BindError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row: Option<sqlx::postgres::PgRow> = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user")
            .map_err(BindError::Fatal)?;

        Ok(row.as_ref().map(user_from_row))
    }
}
