//! Identity binding: mapping an externally verified identity to an internal
//! user record.
//!
//! The binder consumes a `{external_id, email, display_name}` tuple that an
//! upstream collaborator (password check, OAuth callback) has already
//! verified. It never sees credentials; it only creates or updates the user
//! row keyed by `external_id`.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::token::unix_now;

pub mod postgres;

pub use postgres::PgIdentityBinder;

/// Verified identity tuple handed in by the authentication collaborator.
#[derive(Debug, Clone)]
pub struct Identity {
    pub external_id: String,
    pub email: String,
    pub display_name: String,
}

/// Internal user record owned by the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub display_name: String,
    pub created_at_unix: i64,
    pub updated_at_unix: i64,
}

#[derive(Debug, Error)]
pub enum BindError {
    /// A secondary key (email) is already bound to a different external
    /// identity.
    #[error("credentials already taken")]
    CredentialsTaken,
    /// Unexpected persistence failure; logged by the caller, surfaced as a
    /// generic internal error, never retried here.
    #[error("internal error")]
    Fatal(#[from] anyhow::Error),
}

#[async_trait]
pub trait IdentityBinder: Send + Sync {
    /// Create-or-update upsert keyed by `external_id`.
    async fn resolve(&self, identity: &Identity) -> Result<User, BindError>;

    /// Fetch a user by internal id.
    async fn get(&self, user_id: Uuid) -> Result<Option<User>, BindError>;
}

/// In-memory binder for local development and tests.
#[derive(Debug, Default)]
pub struct MemoryIdentityBinder {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryIdentityBinder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityBinder for MemoryIdentityBinder {
    async fn resolve(&self, identity: &Identity) -> Result<User, BindError> {
        let mut users = self.users.lock().await;

        let email_taken = users.values().any(|user| {
            user.email == identity.email && user.external_id != identity.external_id
        });
        if email_taken {
            return Err(BindError::CredentialsTaken);
        }

        let now = unix_now();
        let user = users
            .entry(identity.external_id.clone())
            .and_modify(|user| {
                user.email = identity.email.clone();
                user.display_name = identity.display_name.clone();
                user.updated_at_unix = now;
            })
            .or_insert_with(|| User {
                id: Uuid::new_v4(),
                external_id: identity.external_id.clone(),
                email: identity.email.clone(),
                display_name: identity.display_name.clone(),
                created_at_unix: now,
                updated_at_unix: now,
            });

        Ok(user.clone())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<User>, BindError> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.id == user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn identity(external_id: &str, email: &str) -> Identity {
        Identity {
            external_id: external_id.to_string(),
            email: email.to_string(),
            display_name: "Alice".to_string(),
        }
    }

    #[tokio::test]
    async fn resolve_creates_then_updates_in_place() -> Result<()> {
        let binder = MemoryIdentityBinder::new();

        let created = binder.resolve(&identity("google:1", "a@example.com")).await?;
        let updated = binder
            .resolve(&Identity {
                display_name: "Alice B".to_string(),
                ..identity("google:1", "a@example.com")
            })
            .await?;

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.display_name, "Alice B");
        assert!(binder.get(created.id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn email_bound_to_another_identity_is_rejected() -> Result<()> {
        let binder = MemoryIdentityBinder::new();
        binder.resolve(&identity("google:1", "a@example.com")).await?;

        let conflict = binder.resolve(&identity("google:2", "a@example.com")).await;
        assert!(matches!(conflict, Err(BindError::CredentialsTaken)));
        Ok(())
    }

    #[tokio::test]
    async fn get_unknown_user_is_none() -> Result<()> {
        let binder = MemoryIdentityBinder::new();
        assert!(binder.get(Uuid::new_v4()).await?.is_none());
        Ok(())
    }
}
