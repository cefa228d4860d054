//! Client storage: creation, credential lookups, revocation and the pinned
//! long-lived access-token hash.

use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::users::insert_subject_roles;
use super::{InsertOutcome, is_unique_violation, query_span};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct ClientRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub client_id: String,
    pub secret_enc: String,
    pub access_token_hash: Option<String>,
    pub revoked: bool,
}

#[derive(Debug, Clone)]
pub struct ClientSummary {
    pub subject_id: Uuid,
    pub client_id: String,
    pub name: String,
    pub revoked: bool,
    pub deleted: bool,
    pub has_pinned_token: bool,
}

#[derive(Debug)]
pub struct NewClient {
    pub client_id: String,
    pub secret_enc: String,
    pub name: String,
    pub description: Option<String>,
    pub role_ids: Vec<Uuid>,
}

/// Client row for an authenticated subject; live subjects only.
pub async fn by_subject_id(pool: &PgPool, subject_id: Uuid) -> EngineResult<Option<ClientRecord>> {
    let query = r"
        SELECT clients.id, clients.subject_id, clients.client_id, clients.secret_enc,
               clients.access_token_hash, clients.revoked
        FROM clients
        JOIN subjects ON subjects.id = clients.subject_id
        WHERE clients.subject_id = $1
          AND subjects.deleted = false
    ";
    let row = sqlx::query(query)
        .bind(subject_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(row.map(record_from_row))
}

/// Client row by its string identifier; live subjects only.
pub async fn by_client_id(pool: &PgPool, client_id: &str) -> EngineResult<Option<ClientRecord>> {
    let query = r"
        SELECT clients.id, clients.subject_id, clients.client_id, clients.secret_enc,
               clients.access_token_hash, clients.revoked
        FROM clients
        JOIN subjects ON subjects.id = clients.subject_id
        WHERE clients.client_id = $1
          AND subjects.deleted = false
    ";
    let row = sqlx::query(query)
        .bind(client_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(row.map(record_from_row))
}

/// Create the subject row, the client row and the role assignments in one
/// transaction.
pub async fn create(pool: &PgPool, client: NewClient) -> EngineResult<InsertOutcome<Uuid>> {
    if client.role_ids.is_empty() {
        return Err(EngineError::configuration(
            "a new client requires at least one role",
        ));
    }

    let mut tx = pool.begin().await?;
    let subject_id = Uuid::new_v4();

    let query = "INSERT INTO subjects (id, name, description, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(subject_id)
        .bind(&client.name)
        .bind(&client.description)
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    let query = r"
        INSERT INTO clients (id, subject_id, client_id, secret_enc, access_token_hash, revoked)
        VALUES ($1, $2, $3, $4, NULL, false)
    ";
    let inserted = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(subject_id)
        .bind(&client.client_id)
        .bind(&client.secret_enc)
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await;

    if let Err(err) = inserted {
        if is_unique_violation(&err) {
            let _ = tx.rollback().await;
            return Ok(InsertOutcome::Conflict);
        }
        return Err(err.into());
    }

    insert_subject_roles(&mut tx, subject_id, &client.role_ids).await?;

    tx.commit().await?;
    Ok(InsertOutcome::Created(subject_id))
}

pub async fn list(pool: &PgPool) -> EngineResult<Vec<ClientSummary>> {
    let query = r"
        SELECT clients.subject_id, clients.client_id, subjects.name, clients.revoked,
               subjects.deleted, clients.access_token_hash IS NOT NULL AS has_pinned_token
        FROM clients
        JOIN subjects ON subjects.id = clients.subject_id
        ORDER BY clients.client_id
    ";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ClientSummary {
            subject_id: row.get("subject_id"),
            client_id: row.get("client_id"),
            name: row.get("name"),
            revoked: row.get("revoked"),
            deleted: row.get("deleted"),
            has_pinned_token: row.get("has_pinned_token"),
        })
        .collect())
}

/// Flip the revocation flag. Checked on every guarded request, so the change
/// takes effect immediately.
pub async fn set_revoked(pool: &PgPool, subject_id: Uuid, revoked: bool) -> EngineResult<()> {
    let query = "UPDATE clients SET revoked = $2 WHERE subject_id = $1";
    let result = sqlx::query(query)
        .bind(subject_id)
        .bind(revoked)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("client"));
    }
    Ok(())
}

/// Pin (or clear) the long-lived access-token hash. Clearing invalidates an
/// outstanding non-expiring token without touching the signing secret.
pub async fn set_access_token_hash(
    pool: &PgPool,
    subject_id: Uuid,
    token_hash: Option<&str>,
) -> EngineResult<()> {
    let query = "UPDATE clients SET access_token_hash = $2 WHERE subject_id = $1";
    let result = sqlx::query(query)
        .bind(subject_id)
        .bind(token_hash)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("client"));
    }
    Ok(())
}

pub async fn soft_delete(pool: &PgPool, subject_id: Uuid) -> EngineResult<()> {
    super::users::soft_delete(pool, subject_id).await
}

fn record_from_row(row: sqlx::postgres::PgRow) -> ClientRecord {
    ClientRecord {
        id: row.get("id"),
        subject_id: row.get("subject_id"),
        client_id: row.get("client_id"),
        secret_enc: row.get("secret_enc"),
        access_token_hash: row.get("access_token_hash"),
        revoked: row.get("revoked"),
    }
}
