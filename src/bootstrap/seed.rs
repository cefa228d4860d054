//! Baseline data seeding and the one-time admin credentials artifact.

use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use std::fs;
use std::path::Path;
use tracing::Instrument;
use ulid::Ulid;
use uuid::Uuid;

use super::BootstrapConfig;
use crate::credentials;
use crate::error::{EngineError, EngineResult};
use crate::guard::{GLOBAL_RESOURCE, WILDCARD_ACTION};
use crate::store::{applications, query_span, resources, users::insert_subject_roles};

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_ROLE: &str = "admin";

/// Generated admin credentials. Written once to a local file after a fresh
/// seed; this is the only place cleartext credentials leave the process.
#[derive(Debug, Serialize)]
pub struct SeededCredentials {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Seed baseline identity/role/permission data inside one transaction:
/// a root application, the system resources (global wildcard resource
/// first), an admin role granted the wildcard permission on the global
/// resource only, and the admin user + client subjects.
pub async fn seed(pool: &PgPool, config: &BootstrapConfig) -> EngineResult<SeededCredentials> {
    let mut tx = pool.begin().await?;

    let application_id =
        applications::create_in_tx(&mut tx, "root", Some("Root application namespace")).await?;

    let global_resource_id =
        resources::create_in_tx(&mut tx, application_id, GLOBAL_RESOURCE).await?;
    for name in &config.system_resources {
        if name != GLOBAL_RESOURCE {
            resources::create_in_tx(&mut tx, application_id, name).await?;
        }
    }

    let wildcard_permission_id = wildcard_permission(&mut tx, global_resource_id).await?;

    let role_id = Uuid::new_v4();
    let query = "INSERT INTO roles (id, name, description, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(role_id)
        .bind(ADMIN_ROLE)
        .bind("Grants everything via the global wildcard permission")
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    let query = "INSERT INTO role_permissions (id, role_id, permission_id) VALUES ($1, $2, $3)";
    sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(role_id)
        .bind(wildcard_permission_id)
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    // Admin user subject.
    let password = generate_credential()?;
    let password_hash = credentials::hash_password(&password)
        .map_err(|err| EngineError::configuration(err.to_string()))?;

    let user_subject_id = Uuid::new_v4();
    let query = "INSERT INTO subjects (id, name, description, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(user_subject_id)
        .bind(ADMIN_USERNAME)
        .bind("Bootstrap administrator")
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    let query =
        "INSERT INTO users (id, subject_id, username, password_hash) VALUES ($1, $2, $3, $4)";
    sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(user_subject_id)
        .bind(ADMIN_USERNAME)
        .bind(&password_hash)
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    // Admin client subject; each subject backs exactly one concrete row.
    let client_id = format!("admin-{}", Ulid::new().to_string().to_lowercase());
    let client_secret = generate_credential()?;
    let secret_enc =
        credentials::encrypt_secret(&client_secret, config.master_secret.expose_secret())
            .map_err(|err| EngineError::configuration(err.to_string()))?;

    let client_subject_id = Uuid::new_v4();
    let query = "INSERT INTO subjects (id, name, description, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(client_subject_id)
        .bind(&client_id)
        .bind("Bootstrap administrator client")
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    let query = r"
        INSERT INTO clients (id, subject_id, client_id, secret_enc, access_token_hash, revoked)
        VALUES ($1, $2, $3, $4, NULL, false)
    ";
    sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(client_subject_id)
        .bind(&client_id)
        .bind(&secret_enc)
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    insert_subject_roles(&mut tx, user_subject_id, &[role_id]).await?;
    insert_subject_roles(&mut tx, client_subject_id, &[role_id]).await?;

    tx.commit().await?;

    Ok(SeededCredentials {
        username: ADMIN_USERNAME.to_string(),
        password,
        client_id,
        client_secret,
    })
}

async fn wildcard_permission(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    resource_id: Uuid,
) -> EngineResult<Uuid> {
    let query = "SELECT id FROM permissions WHERE resource_id = $1 AND action = $2";
    let row: (Uuid,) = sqlx::query_as(query)
        .bind(resource_id)
        .bind(WILDCARD_ACTION)
        .fetch_one(&mut **tx)
        .instrument(query_span("SELECT", query))
        .await?;
    Ok(row.0)
}

/// Random URL-safe credential, 24 bytes of OS entropy.
pub(super) fn generate_credential() -> EngineResult<String> {
    let mut bytes = [0u8; 24];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| EngineError::configuration(format!("credential generation failed: {err}")))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Write the credentials artifact for the operator to retrieve once.
pub fn write_credentials_file(path: &Path, creds: &SeededCredentials) -> EngineResult<()> {
    let payload = serde_json::to_string_pretty(creds)
        .map_err(|err| EngineError::configuration(format!("credentials serialization: {err}")))?;
    fs::write(path, payload).map_err(|err| {
        EngineError::configuration(format!(
            "failed to write credentials file {}: {err}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_credentials_are_distinct_and_url_safe() -> EngineResult<()> {
        let first = generate_credential()?;
        let second = generate_credential()?;
        assert_ne!(first, second);
        let decoded_len = Base64UrlUnpadded::decode_vec(&first).ok().map(|b| b.len());
        assert_eq!(decoded_len, Some(24));
        Ok(())
    }

    #[test]
    fn credentials_file_round_trip() -> EngineResult<()> {
        let creds = SeededCredentials {
            username: "admin".to_string(),
            password: "pw".to_string(),
            client_id: "admin-x".to_string(),
            client_secret: "cs".to_string(),
        };
        let path = std::env::temp_dir().join(format!("vigilo-creds-{}.json", Ulid::new()));

        write_credentials_file(&path, &creds)?;
        let written = fs::read_to_string(&path)
            .map_err(|err| EngineError::configuration(err.to_string()))?;
        let _ = fs::remove_file(&path);

        let parsed: serde_json::Value = serde_json::from_str(&written)
            .map_err(|err| EngineError::configuration(err.to_string()))?;
        assert_eq!(parsed["username"], "admin");
        assert_eq!(parsed["password"], "pw");
        assert_eq!(parsed["client_id"], "admin-x");
        assert_eq!(parsed["client_secret"], "cs");
        Ok(())
    }
}
