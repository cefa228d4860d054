//! # Vigilo (Embeddable Authorization & Identity Engine)
//!
//! `vigilo` issues and validates credentials (passwords, signed tokens,
//! long-lived client tokens), enforces a role-based permission model on
//! every incoming request, and keeps its own relational schema
//! self-consistent.
//!
//! ## Permission Model
//!
//! Permissions are flat `(resource, action)` pairs; the action may be a
//! concrete verb or the wildcard `*`. The resource named `OAUTH2_global`,
//! matched with the wildcard action, grants everything. Subjects (users and
//! clients) hold permissions through roles; the per-request guard resolves
//! the subject's role tree from the store on every decision, so revocations
//! and role changes take effect on the very next request.
//!
//! ## Schema Self-Healing
//!
//! At startup the bootstrap audits the live schema against a static
//! descriptor. Any missing table or mismatched column triggers a full
//! destructive rebuild and reseed: there is deliberately no incremental
//! migration path. A fresh seed writes the generated admin credentials to a
//! local file, the only place cleartext credentials leave the process.
//!
//! ## Soft Deletes
//!
//! Subjects, roles, resources and permissions are soft-deleted via flags,
//! checked on every authorization read path; only join-row diffs hard-delete
//! rows.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod credentials;
pub mod denorm;
pub mod error;
pub mod guard;
pub mod store;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
