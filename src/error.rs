//! Engine error taxonomy.
//!
//! Every rejection carries a stable numeric code plus a human readable
//! message. Store failures keep the low-level `sqlx` error for operator
//! diagnostics; the API boundary decides what reaches the client.

use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A route without a registered permission, a malformed stored
    /// expression, or an unreadable schema. Programming/deployment errors,
    /// never bypassed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing, invalid or expired credentials. Recoverable: public routes
    /// continue as anonymous, guarded routes reject.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Authenticated but not allowed, or revoked client credentials.
    #[error("authorization denied: {0}")]
    Authorization(String),

    /// A referenced subject, role, resource or permission does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Query or transaction failure. Never retried automatically; most
    /// engine writes are non-idempotent.
    #[error("store failure")]
    Store(#[from] sqlx::Error),
}

impl EngineError {
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Configuration(_) => 1000,
            Self::Authentication(_) => 2000,
            Self::Authorization(_) => 3000,
            Self::NotFound(_) => 4000,
            Self::Store(_) => 5000,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::configuration("x").code(), 1000);
        assert_eq!(EngineError::authentication("x").code(), 2000);
        assert_eq!(EngineError::authorization("x").code(), 3000);
        assert_eq!(EngineError::not_found("x").code(), 4000);
        assert_eq!(EngineError::Store(sqlx::Error::RowNotFound).code(), 5000);
    }

    #[test]
    fn messages_keep_detail() {
        let err = EngineError::authorization("missing permission OAUTH2_role:create");
        assert_eq!(
            err.to_string(),
            "authorization denied: missing permission OAUTH2_role:create"
        );
    }

    #[test]
    fn store_errors_convert() {
        let err = EngineError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, EngineError::Store(_)));
    }
}
