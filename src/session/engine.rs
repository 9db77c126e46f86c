//! Session lifecycle engine: token issuance, rotation, reuse detection,
//! per-subject limits, and teardown.
//!
//! Per-session state machine: `ACTIVE(generation)` advances to a new
//! generation on every successful refresh and ends in a terminal revoked
//! state on logout or detected reuse. Correctness under concurrent refresh
//! calls rests entirely on the store's `rotate` being an atomic
//! compare-and-swap; the engine never reads a generation and writes it back.

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use super::config::SessionConfig;
use super::store::{RotateOutcome, Session, SessionStore};
use crate::token::{TokenCodec, TokenKind, TokenPayload, unix_now};

/// Freshly minted access/refresh credentials bound to one generation.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Typed outcomes of the lifecycle engine. These never cross the engine
/// boundary as opaque panics or stringly errors; the HTTP layer maps each
/// variant to a status code.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed, forged, or expired token. The caller must re-authenticate.
    #[error("invalid token")]
    Invalid,
    /// A valid-looking refresh token named a stale generation. The session
    /// has been destroyed; the caller must fully re-login.
    #[error("refresh token reuse detected")]
    Fraud,
    /// The session is already gone (logout or sweep).
    #[error("session not found")]
    NotFound,
    /// Too many concurrent sessions; login refused with no partial state.
    #[error("session limit exceeded")]
    LimitExceeded,
    /// Unexpected storage failure; logged with its cause and surfaced to the
    /// caller as a generic failure, never retried here.
    #[error("internal error")]
    Fatal(#[from] anyhow::Error),
}

pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    codec: TokenCodec,
    config: SessionConfig,
}

impl SessionEngine {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, codec: TokenCodec, config: SessionConfig) -> Self {
        Self {
            store,
            codec,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a session for an already-verified subject and mint its first
    /// token pair.
    ///
    /// # Errors
    ///
    /// `LimitExceeded` when the subject already holds the configured number
    /// of sessions; `Fatal` on storage failure.
    pub async fn login(&self, subject_id: Uuid) -> Result<TokenPair, AuthError> {
        if let Some(limit) = self.config.max_sessions_per_subject() {
            let active = self.store.active_count_for_subject(subject_id).await?;
            if active >= i64::from(limit) {
                return Err(AuthError::LimitExceeded);
            }
        }

        let session = self.store.create(subject_id).await?;
        self.mint_pair(&session)
    }

    /// Redeem a refresh token for a new pair, rotating the generation.
    ///
    /// A stale generation is treated as fraud without trying to distinguish
    /// benign duplicate retries from theft: the session is deleted and the
    /// caller must re-login. That trades a rare false positive for the
    /// absence of any replay window.
    ///
    /// # Errors
    ///
    /// `Invalid` for any codec failure, `NotFound` when the session is gone,
    /// `Fraud` on generation mismatch, `Fatal` on storage failure.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let TokenPayload::Refresh { sid, gen } = self
            .codec
            .verify(refresh_token, TokenKind::Refresh, unix_now())
            .map_err(|_| AuthError::Invalid)?
        else {
            return Err(AuthError::Invalid);
        };

        match self.store.rotate(sid, gen).await? {
            RotateOutcome::Rotated(session) => self.mint_pair(&session),
            RotateOutcome::NotFound => Err(AuthError::NotFound),
            RotateOutcome::GenerationMismatch => {
                warn!(session_id = %sid, "stale refresh generation presented, destroying session");
                self.store.delete(sid).await?;
                Err(AuthError::Fraud)
            }
        }
    }

    /// Tear down a session. Idempotent; a second logout is not an error.
    ///
    /// # Errors
    ///
    /// `Fatal` on storage failure.
    pub async fn logout(&self, session_id: Uuid) -> Result<(), AuthError> {
        self.store.delete(session_id).await?;
        Ok(())
    }

    /// Tear down the session behind a presented access token.
    ///
    /// The access payload does not carry the session id, so the session is
    /// resolved through its current generation. A generation that resolves
    /// to nothing means the session is already gone; that still counts as a
    /// successful logout.
    ///
    /// # Errors
    ///
    /// `Invalid` when the token fails verification, `Fatal` on storage
    /// failure.
    pub async fn logout_by_access(&self, access_token: &str) -> Result<(), AuthError> {
        let payload = self
            .codec
            .verify(access_token, TokenKind::Access, unix_now())
            .map_err(|_| AuthError::Invalid)?;

        if let Some(session) = self.store.find_by_generation(payload.generation()).await? {
            self.store.delete(session.id).await?;
        }
        Ok(())
    }

    /// Verify an access token and return its subject.
    ///
    /// On top of the stateless signature/expiry check, the generation is
    /// cross-checked against the store so logout and fraud teardown
    /// invalidate access tokens immediately instead of waiting for expiry.
    ///
    /// # Errors
    ///
    /// `Invalid` on any codec error or freshness failure, `Fatal` on
    /// storage failure.
    pub async fn verify_access(&self, access_token: &str) -> Result<Uuid, AuthError> {
        let now = unix_now();
        let TokenPayload::Access { sub, gen } = self
            .codec
            .verify(access_token, TokenKind::Access, now)
            .map_err(|_| AuthError::Invalid)?
        else {
            return Err(AuthError::Invalid);
        };

        let Some(session) = self.store.find_by_generation(gen).await? else {
            return Err(AuthError::Invalid);
        };
        if session.subject_id != sub {
            return Err(AuthError::Invalid);
        }
        if now - session.last_activity_at_unix >= self.config.access_ttl_seconds() {
            return Err(AuthError::Invalid);
        }

        Ok(sub)
    }

    /// Read-only pre-flight check for a refresh token. Never mutates.
    ///
    /// A refresh is honored only once the last rotation is at least
    /// `refresh_not_before` old (rate-limiting token grinding) and while the
    /// session is younger than the refresh TTL.
    ///
    /// # Errors
    ///
    /// `Invalid` when the token itself fails verification, `Fatal` on
    /// storage failure.
    pub async fn verify_refresh(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let now = unix_now();
        let TokenPayload::Refresh { sid, .. } = self
            .codec
            .verify(refresh_token, TokenKind::Refresh, now)
            .map_err(|_| AuthError::Invalid)?
        else {
            return Err(AuthError::Invalid);
        };

        let Some(session) = self.store.get(sid).await? else {
            return Ok(false);
        };
        let session_age = now - session.created_at_unix;
        let since_rotation = now - session.last_activity_at_unix;

        Ok(session_age < self.config.refresh_ttl_seconds()
            && since_rotation >= self.config.refresh_not_before_seconds())
    }

    fn mint_pair(&self, session: &Session) -> Result<TokenPair, AuthError> {
        let access = self
            .codec
            .issue(
                TokenPayload::Access {
                    sub: session.subject_id,
                    gen: session.generation,
                },
                self.config.access_ttl_seconds(),
            )
            .map_err(|err| AuthError::Fatal(err.into()))?;
        let refresh = self
            .codec
            .issue(
                TokenPayload::Refresh {
                    sid: session.id,
                    gen: session.generation,
                },
                self.config.refresh_ttl_seconds(),
            )
            .map_err(|err| AuthError::Fatal(err.into()))?;

        Ok(TokenPair {
            access_token: access,
            refresh_token: refresh,
        })
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
