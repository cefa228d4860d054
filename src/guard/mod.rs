//! Request-time permission guard.
//!
//! Each request is evaluated exactly once: `unchecked → allowed | rejected`.
//! There is no cross-request cache; every decision re-reads the store so a
//! revocation or role change takes effect on the very next request.

use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

use crate::credentials::{self, SubjectKind, TokenClaims};
use crate::denorm::{self, RoleGrant};
use crate::error::EngineError;
use crate::store;

mod registry;

pub use registry::{Expr, RouteRegistry, normalize_path, pattern_for};

/// Wildcard resource name: matched with the wildcard action it grants
/// everything.
pub const GLOBAL_RESOURCE: &str = "OAUTH2_global";

/// Wildcard action: grants every action on its resource.
pub const WILDCARD_ACTION: &str = "*";

/// Authenticated subject resolved from a verified token, tagged by concrete
/// variant once at the boundary instead of re-branching on type strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthSubject {
    User { subject_id: Uuid, username: String },
    Client { subject_id: Uuid, client_id: String },
}

impl AuthSubject {
    #[must_use]
    pub const fn subject_id(&self) -> Uuid {
        match self {
            Self::User { subject_id, .. } | Self::Client { subject_id, .. } => *subject_id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::User { username, .. } => username,
            Self::Client { client_id, .. } => client_id,
        }
    }
}

impl From<TokenClaims> for AuthSubject {
    fn from(claims: TokenClaims) -> Self {
        match claims.kind {
            SubjectKind::User => Self::User {
                subject_id: claims.sub,
                username: claims.name,
            },
            SubjectKind::Client => Self::Client {
                subject_id: claims.sub,
                client_id: claims.name,
            },
        }
    }
}

/// Parsed `"resource:action"` requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub resource: String,
    pub action: String,
}

impl Requirement {
    /// Split a stored expression into exactly two non-empty parts.
    ///
    /// # Errors
    /// A malformed stored expression is a guard configuration error,
    /// distinct from "no subject" or "insufficient permission".
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let mut parts = raw.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(resource), Some(action), None) if !resource.is_empty() && !action.is_empty() => {
                Ok(Self {
                    resource: resource.to_string(),
                    action: action.to_string(),
                })
            }
            _ => Err(EngineError::configuration(format!(
                "malformed permission expression: {raw:?}"
            ))),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// Pure decision core: does any grant in the resolved tree satisfy the
/// requirement? First match wins; permission order is irrelevant.
#[must_use]
pub fn evaluate(required: &Requirement, roles: &[RoleGrant]) -> bool {
    for role in roles {
        for grant in &role.resources {
            let has_wildcard = grant.actions.iter().any(|a| a == WILDCARD_ACTION);
            if grant.resource == GLOBAL_RESOURCE && has_wildcard {
                return true;
            }
            if grant.resource == required.resource
                && (has_wildcard || grant.actions.iter().any(|a| *a == required.action))
            {
                return true;
            }
        }
    }
    false
}

/// Decide whether the caller may perform the request, per the registered
/// expression for `(method, pattern)`.
///
/// `bearer` is the raw presented token, needed when a client has pinned a
/// long-lived access token.
///
/// # Errors
/// - `Configuration`: unregistered route or malformed stored expression.
/// - `Authentication`: guarded route with no authenticated subject.
/// - `Authorization`: revoked client, pinned-token mismatch, or no matching
///   permission.
/// - `NotFound` / `Store`: subject lookups.
pub async fn authorize_request(
    registry: &RouteRegistry,
    pool: &PgPool,
    method: &axum::http::Method,
    pattern: &str,
    subject: Option<&AuthSubject>,
    bearer: Option<&str>,
) -> Result<(), EngineError> {
    let Some(expr) = registry.lookup(method, pattern) else {
        return Err(EngineError::configuration(format!(
            "no permission registered for {method} {pattern}"
        )));
    };

    let required = match expr {
        Expr::Public => return Ok(()),
        Expr::Required(raw) => Requirement::parse(raw)?,
    };

    let Some(subject) = subject else {
        return Err(EngineError::authentication("authentication required"));
    };

    if let AuthSubject::Client { subject_id, .. } = subject {
        let client = store::clients::by_subject_id(pool, *subject_id)
            .await?
            .ok_or_else(|| EngineError::not_found("client for authenticated subject"))?;
        check_client(&client, bearer)?;
    }

    let rows = store::permissions::subject_permission_rows(pool, subject.subject_id()).await?;
    let tree = denorm::subject_tree(&rows);
    let roles = tree
        .first()
        .map_or(&[] as &[RoleGrant], |grants| grants.roles.as_slice());

    if evaluate(&required, roles) {
        Ok(())
    } else {
        Err(EngineError::authorization(format!(
            "missing permission {required}"
        )))
    }
}

/// Client-specific checks, evaluated before any permission lookup.
///
/// Revocation wins over any structurally valid, unexpired token. A client
/// that has pinned a long-lived token must present exactly that token.
///
/// # Errors
/// `Authorization` for revoked clients and pinned-token mismatches,
/// `Authentication` when a pinned client presents no bearer token at all.
pub fn check_client(
    record: &store::clients::ClientRecord,
    bearer: Option<&str>,
) -> Result<(), EngineError> {
    if record.revoked {
        return Err(EngineError::authorization("client credentials revoked"));
    }

    if let Some(pinned) = &record.access_token_hash {
        let presented =
            bearer.ok_or_else(|| EngineError::authentication("missing bearer token for client"))?;
        if !credentials::verify_password(presented, pinned) {
            return Err(EngineError::authorization(
                "presented token does not match pinned client token",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denorm::ResourceGrant;

    fn role(name: &str, resources: Vec<ResourceGrant>) -> RoleGrant {
        RoleGrant {
            role_id: Uuid::new_v4(),
            role_name: name.to_string(),
            resources,
        }
    }

    fn grant(resource: &str, actions: &[&str]) -> ResourceGrant {
        ResourceGrant {
            resource: resource.to_string(),
            actions: actions.iter().map(ToString::to_string).collect(),
        }
    }

    fn requirement(resource: &str, action: &str) -> Requirement {
        Requirement {
            resource: resource.to_string(),
            action: action.to_string(),
        }
    }

    #[test]
    fn parse_accepts_two_part_expressions() {
        let parsed = Requirement::parse("OAUTH2_role:create").expect("valid expression");
        assert_eq!(parsed.resource, "OAUTH2_role");
        assert_eq!(parsed.action, "create");
        assert_eq!(parsed.to_string(), "OAUTH2_role:create");
    }

    #[test]
    fn parse_rejects_malformed_expressions() {
        for raw in ["badexpression", "a:b:c", ":create", "role:", ":"] {
            let err = Requirement::parse(raw).expect_err(raw);
            assert!(matches!(err, EngineError::Configuration(_)), "{raw}");
        }
    }

    #[test]
    fn global_wildcard_allows_everything() {
        let roles = vec![role("admin", vec![grant(GLOBAL_RESOURCE, &["*"])])];
        for (resource, action) in [
            ("OAUTH2_role", "create"),
            ("OAUTH2_user", "delete"),
            ("anything", "whatever"),
        ] {
            assert!(evaluate(&requirement(resource, action), &roles));
        }
    }

    #[test]
    fn global_resource_without_wildcard_action_grants_nothing_extra() {
        let roles = vec![role("odd", vec![grant(GLOBAL_RESOURCE, &["select"])])];
        assert!(!evaluate(&requirement("OAUTH2_role", "select"), &roles));
        assert!(evaluate(&requirement(GLOBAL_RESOURCE, "select"), &roles));
    }

    #[test]
    fn resource_wildcard_allows_any_action_on_that_resource() {
        let roles = vec![role("role-admin", vec![grant("OAUTH2_role", &["*"])])];
        assert!(evaluate(&requirement("OAUTH2_role", "create"), &roles));
        assert!(evaluate(&requirement("OAUTH2_role", "delete"), &roles));
        assert!(!evaluate(&requirement("OAUTH2_user", "create"), &roles));
    }

    #[test]
    fn exact_match_allows_only_that_action() {
        let roles = vec![role("viewer", vec![grant("OAUTH2_role", &["select"])])];
        assert!(evaluate(&requirement("OAUTH2_role", "select"), &roles));
        assert!(!evaluate(&requirement("OAUTH2_user", "select"), &roles));
        assert!(!evaluate(&requirement("OAUTH2_role", "create"), &roles));
    }

    #[test]
    fn empty_tree_denies_by_default() {
        assert!(!evaluate(&requirement("OAUTH2_role", "select"), &[]));
    }

    #[test]
    fn scenario_role_create() {
        // Registered POST /role with "OAUTH2_role:create".
        let required = Requirement::parse("OAUTH2_role:create").expect("valid");

        let select_only = vec![role("viewer", vec![grant("OAUTH2_role", &["select"])])];
        assert!(!evaluate(&required, &select_only));

        let role_wildcard = vec![role("role-admin", vec![grant("OAUTH2_role", &["*"])])];
        assert!(evaluate(&required, &role_wildcard));
    }

    fn client_record(revoked: bool, access_token_hash: Option<String>) -> store::clients::ClientRecord {
        store::clients::ClientRecord {
            id: Uuid::new_v4(),
            subject_id: Uuid::new_v4(),
            client_id: "svc-1".to_string(),
            secret_enc: "00ff|.|00".to_string(),
            access_token_hash,
            revoked,
        }
    }

    #[test]
    fn revocation_wins_over_valid_token() {
        // Even a structurally valid, unexpired, correctly-permissioned token
        // is rejected once the client is revoked.
        let record = client_record(true, None);
        let err = check_client(&record, Some("valid.looking.token")).expect_err("revoked");
        assert!(matches!(err, EngineError::Authorization(_)));
    }

    #[test]
    fn pinned_token_must_match() {
        let pinned = crate::credentials::hash_password("the-pinned-token").expect("hash");
        let record = client_record(false, Some(pinned));

        assert!(check_client(&record, Some("the-pinned-token")).is_ok());

        let err = check_client(&record, Some("some-other-token")).expect_err("mismatch");
        assert!(matches!(err, EngineError::Authorization(_)));

        let err = check_client(&record, None).expect_err("missing bearer");
        assert!(matches!(err, EngineError::Authentication(_)));
    }

    #[test]
    fn unpinned_live_client_passes() {
        let record = client_record(false, None);
        assert!(check_client(&record, None).is_ok());
    }

    #[test]
    fn auth_subject_from_claims() {
        let id = Uuid::new_v4();
        let claims = TokenClaims {
            sub: id,
            kind: SubjectKind::Client,
            name: "svc-1".to_string(),
            exp: None,
        };
        let subject = AuthSubject::from(claims);
        assert_eq!(subject.subject_id(), id);
        assert_eq!(subject.name(), "svc-1");
        assert!(matches!(subject, AuthSubject::Client { .. }));
    }
}
