//! Compact signed tokens for the session engine.
//!
//! Tokens are JWTs signed with HMAC-SHA256: `base64url(header).base64url(claims).base64url(mac)`.
//! The claims carry a tagged payload (`kind = access | refresh`) next to the
//! standard `iat`/`exp`/`jti` fields, so a refresh token can never be accepted
//! where an access token is expected.
//!
//! Access tokens verify without any storage round trip; refresh tokens are
//! always re-checked against the session store by the lifecycle engine.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use ulid::Ulid;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_VERSION: u8 = 1;

/// Minimum signing key length in bytes.
const MIN_KEY_BYTES: usize = 32;

/// Current unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Expected payload kind, chosen by the caller at verification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Signed token payload. The `kind` tag is part of the signed claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TokenPayload {
    /// Short-lived credential bound to a subject and the generation that
    /// was current when it was minted.
    Access { sub: Uuid, gen: Uuid },
    /// Long-lived credential naming a session and the generation it is
    /// allowed to redeem.
    Refresh { sid: Uuid, gen: Uuid },
}

impl TokenPayload {
    #[must_use]
    pub const fn kind(&self) -> TokenKind {
        match self {
            Self::Access { .. } => TokenKind::Access,
            Self::Refresh { .. } => TokenKind::Refresh,
        }
    }

    /// Generation the token is bound to.
    #[must_use]
    pub const fn generation(&self) -> Uuid {
        match self {
            Self::Access { gen, .. } | Self::Refresh { gen, .. } => *gen,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    v: u8,
    iat: i64,
    exp: i64,
    jti: String,
    #[serde(flatten)]
    payload: TokenPayload,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("unexpected token kind")]
    KindMismatch,
    #[error("invalid token version")]
    InvalidVersion,
    #[error("signing key must be at least {MIN_KEY_BYTES} bytes")]
    WeakKey,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, Error> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| Error::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Stateless signer/verifier for access and refresh tokens.
///
/// Pure function of key material, clock, and input; key misconfiguration is
/// caught once at construction, not per request.
#[derive(Clone)]
pub struct TokenCodec {
    mac: HmacSha256,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("key", &"***").finish()
    }
}

impl TokenCodec {
    /// Build a codec from raw key material.
    ///
    /// # Errors
    ///
    /// Returns `WeakKey` when the key is shorter than 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        if key.len() < MIN_KEY_BYTES {
            return Err(Error::WeakKey);
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|_| Error::WeakKey)?;
        Ok(Self { mac })
    }

    fn mac(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }

    /// Sign a payload with an expiry `ttl_seconds` from now.
    ///
    /// # Errors
    ///
    /// Returns an error only if the claims cannot be encoded as JSON.
    pub fn issue(&self, payload: TokenPayload, ttl_seconds: i64) -> Result<String, Error> {
        let iat = unix_now();
        let claims = TokenClaims {
            v: TOKEN_VERSION,
            iat,
            exp: iat + ttl_seconds,
            jti: Ulid::new().to_string(),
            payload,
        };

        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let mac_b64 = Base64UrlUnpadded::encode_string(&self.mac(signing_input.as_bytes()));

        Ok(format!("{signing_input}.{mac_b64}"))
    }

    /// Verify a token and return its payload.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the token is malformed or contains invalid base64/json,
    /// - the MAC does not match (tampered token or wrong key),
    /// - the claims fail validation (`v`, `exp`),
    /// - the payload kind does not match `expected`.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenKind,
        now_unix: i64,
    ) -> Result<TokenPayload, Error> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(Error::TokenFormat)?;
        let mac_b64 = parts.next().ok_or(Error::TokenFormat)?;
        if parts.next().is_some() {
            return Err(Error::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(Error::UnsupportedAlg(header.alg));
        }

        let mac_bytes = Base64UrlUnpadded::decode_vec(mac_b64).map_err(|_| Error::Base64)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        // Constant-time comparison via the Mac trait.
        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&mac_bytes)
            .map_err(|_| Error::InvalidSignature)?;

        let claims: TokenClaims = b64d_json(claims_b64)?;
        if claims.v != TOKEN_VERSION {
            return Err(Error::InvalidVersion);
        }
        if claims.exp <= now_unix {
            return Err(Error::Expired);
        }
        if claims.payload.kind() != expected {
            return Err(Error::KindMismatch);
        }

        Ok(claims.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn codec() -> TokenCodec {
        TokenCodec::new(KEY).expect("valid key")
    }

    #[test]
    fn rejects_short_key() {
        assert!(matches!(TokenCodec::new(b"short"), Err(Error::WeakKey)));
    }

    #[test]
    fn access_token_round_trips() -> Result<()> {
        let codec = codec();
        let sub = Uuid::new_v4();
        let gen = Uuid::new_v4();
        let token = codec.issue(TokenPayload::Access { sub, gen }, 60)?;

        let payload = codec.verify(&token, TokenKind::Access, unix_now())?;
        assert_eq!(payload, TokenPayload::Access { sub, gen });
        Ok(())
    }

    #[test]
    fn refresh_token_presented_as_access_is_kind_mismatch() -> Result<()> {
        let codec = codec();
        let token = codec.issue(
            TokenPayload::Refresh {
                sid: Uuid::new_v4(),
                gen: Uuid::new_v4(),
            },
            60,
        )?;

        let result = codec.verify(&token, TokenKind::Access, unix_now());
        assert!(matches!(result, Err(Error::KindMismatch)));
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected() -> Result<()> {
        let codec = codec();
        let token = codec.issue(
            TokenPayload::Access {
                sub: Uuid::new_v4(),
                gen: Uuid::new_v4(),
            },
            60,
        )?;

        let result = codec.verify(&token, TokenKind::Access, unix_now() + 120);
        assert!(matches!(result, Err(Error::Expired)));
        Ok(())
    }

    #[test]
    fn tampered_claims_fail_signature_check() -> Result<()> {
        let codec = codec();
        let token = codec.issue(
            TokenPayload::Access {
                sub: Uuid::new_v4(),
                gen: Uuid::new_v4(),
            },
            60,
        )?;

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged_claims = Base64UrlUnpadded::encode_string(b"{\"kind\":\"access\"}");
        parts[1] = &forged_claims;
        let forged = parts.join(".");

        let result = codec.verify(&forged, TokenKind::Access, unix_now());
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn wrong_key_fails_signature_check() -> Result<()> {
        let codec = codec();
        let other = TokenCodec::new(b"ffffffffffffffffffffffffffffffff")?;
        let token = codec.issue(
            TokenPayload::Access {
                sub: Uuid::new_v4(),
                gen: Uuid::new_v4(),
            },
            60,
        )?;

        let result = other.verify(&token, TokenKind::Access, unix_now());
        assert!(matches!(result, Err(Error::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn malformed_token_is_rejected() {
        let codec = codec();
        assert!(matches!(
            codec.verify("not-a-token", TokenKind::Access, unix_now()),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            codec.verify("a.b.c.d", TokenKind::Access, unix_now()),
            Err(Error::TokenFormat)
        ));
        assert!(matches!(
            codec.verify("!!.!!.!!", TokenKind::Access, unix_now()),
            Err(Error::Base64)
        ));
    }
}
