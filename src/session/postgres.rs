//! Postgres-backed session store.
//!
//! Rotation is a single conditional `UPDATE ... WHERE id = $1 AND
//! generation = $2`. When it affects no row, a follow-up existence check
//! distinguishes a vanished session from a stale generation; that second
//! read is only used to pick the error kind, never to decide a write.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::store::{RotateOutcome, Session, SessionStore};

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &sqlx::postgres::PgRow) -> Session {
    Session {
        id: row.get("id"),
        generation: row.get("generation"),
        subject_id: row.get("subject_id"),
        created_at_unix: row.get("created_at_unix"),
        last_activity_at_unix: row.get("last_activity_at_unix"),
    }
}

const SESSION_COLUMNS: &str = r"
    id, generation, subject_id,
    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at_unix,
    EXTRACT(EPOCH FROM last_activity_at)::BIGINT AS last_activity_at_unix
";

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, subject_id: Uuid) -> Result<Session> {
        let query = format!(
            r"
            INSERT INTO sessions (id, generation, subject_id)
            VALUES ($1, $2, $3)
            RETURNING {SESSION_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(Uuid::now_v7())
            .bind(Uuid::new_v4())
            .bind(subject_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert session")?;

        Ok(session_from_row(&row))
    }

    async fn get(&self, session_id: Uuid) -> Result<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session")?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn find_by_generation(&self, generation: Uuid) -> Result<Option<Session>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE generation = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(generation)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup session by generation")?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn rotate(&self, session_id: Uuid, expected_generation: Uuid) -> Result<RotateOutcome> {
        let query = format!(
            r"
            UPDATE sessions
            SET generation = $3,
                last_activity_at = GREATEST(last_activity_at, NOW())
            WHERE id = $1 AND generation = $2
            RETURNING {SESSION_COLUMNS}
            "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .bind(expected_generation)
            .bind(Uuid::new_v4())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to rotate session")?;

        if let Some(row) = row {
            return Ok(RotateOutcome::Rotated(session_from_row(&row)));
        }

        let query = "SELECT EXISTS (SELECT 1 FROM sessions WHERE id = $1) AS present";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(session_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check session existence")?;

        if row.get::<bool, _>("present") {
            Ok(RotateOutcome::GenerationMismatch)
        } else {
            Ok(RotateOutcome::NotFound)
        }
    }

    async fn delete(&self, session_id: Uuid) -> Result<()> {
        let query = "DELETE FROM sessions WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete session")?;

        Ok(())
    }

    async fn active_count_for_subject(&self, subject_id: Uuid) -> Result<i64> {
        let query = "SELECT COUNT(*) AS active FROM sessions WHERE subject_id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(subject_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count sessions")?;

        Ok(row.get("active"))
    }

    async fn delete_older_than(&self, max_age_seconds: i64) -> Result<u64> {
        let query = r"
            DELETE FROM sessions
            WHERE created_at < NOW() - ($1 * INTERVAL '1 second')
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(max_age_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to sweep aged sessions")?;

        Ok(result.rows_affected())
    }
}
