//! Signed-token mint and verify (HS256).
//!
//! Short-lived tokens carry an `exp` claim; long-lived client tokens omit it
//! and are additionally hashed server-side so they can be invalidated by
//! deleting the hash, independent of cryptographic expiry.

use anyhow::{Result, anyhow};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Concrete subject variant carried in token claims and resolved once at the
/// data-access boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    User,
    Client,
}

impl SubjectKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Client => "client",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject id (the shared subject row, not the concrete user/client row).
    pub sub: Uuid,
    pub kind: SubjectKind,
    /// Identifying name: username for users, client id for clients.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// Mint a signed token for a subject.
///
/// `ttl_seconds: None` produces a non-expiring token (long-lived client
/// tokens); callers are expected to pin those with a server-side hash.
///
/// # Errors
/// Returns an error if signing fails (bad secret configuration).
pub fn mint_token(
    subject_id: Uuid,
    kind: SubjectKind,
    name: &str,
    jwt_secret: &str,
    ttl_seconds: Option<i64>,
) -> Result<String> {
    let claims = TokenClaims {
        sub: subject_id,
        kind,
        name: name.to_string(),
        exp: ttl_seconds.map(|ttl| chrono::Utc::now().timestamp() + ttl),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|err| anyhow!("token signing failed: {err}"))
}

/// Verify a signed token: signature check plus expiry when `exp` is present.
///
/// # Errors
/// `TokenError::Expired` for valid-but-stale tokens, `TokenError::Invalid`
/// for anything else (bad signature, malformed token, wrong algorithm).
pub fn verify_token(token: &str, jwt_secret: &str) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Long-lived client tokens carry no exp claim; expiry is still enforced
    // whenever the claim is present.
    validation.required_spec_claims.clear();

    decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-jwt-secret";

    #[test]
    fn mint_and_verify_short_lived() -> Result<()> {
        let id = Uuid::new_v4();
        let token = mint_token(id, SubjectKind::User, "alice", SECRET, Some(3600))?;
        let claims = verify_token(&token, SECRET).expect("valid token");
        assert_eq!(claims.sub, id);
        assert_eq!(claims.kind, SubjectKind::User);
        assert_eq!(claims.name, "alice");
        assert!(claims.exp.is_some());
        Ok(())
    }

    #[test]
    fn mint_and_verify_long_lived() -> Result<()> {
        let id = Uuid::new_v4();
        let token = mint_token(id, SubjectKind::Client, "cli-1", SECRET, None)?;
        let claims = verify_token(&token, SECRET).expect("valid token");
        assert_eq!(claims.kind, SubjectKind::Client);
        assert_eq!(claims.exp, None);
        Ok(())
    }

    #[test]
    fn expired_token_is_rejected_as_expired() -> Result<()> {
        // Well past the default validation leeway.
        let token = mint_token(Uuid::new_v4(), SubjectKind::User, "bob", SECRET, Some(-3600))?;
        assert_eq!(verify_token(&token, SECRET), Err(TokenError::Expired));
        Ok(())
    }

    #[test]
    fn wrong_secret_is_invalid() -> Result<()> {
        let token = mint_token(Uuid::new_v4(), SubjectKind::User, "bob", SECRET, Some(3600))?;
        assert_eq!(
            verify_token(&token, "other-secret"),
            Err(TokenError::Invalid)
        );
        Ok(())
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(
            verify_token("not-a-token", SECRET),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn subject_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&SubjectKind::User).ok().as_deref(),
            Some("\"user\"")
        );
        assert_eq!(
            serde_json::to_string(&SubjectKind::Client).ok().as_deref(),
            Some("\"client\"")
        );
        assert_eq!(SubjectKind::User.as_str(), "user");
        assert_eq!(SubjectKind::Client.as_str(), "client");
    }
}
