//! User storage: creation, login lookups, role diffs and soft deletes.

use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{InsertOutcome, is_unique_violation, query_span};
use crate::error::{EngineError, EngineResult};

/// One flat row of the login join; one row per role held by the user.
/// Collapsed with `group_adjacent` before minting a token.
#[derive(Debug, Clone)]
pub struct LoginRow {
    pub user_id: Uuid,
    pub subject_id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role_id: Uuid,
    pub role_name: String,
}

#[derive(Debug, Clone)]
pub struct UserSummary {
    pub subject_id: Uuid,
    pub username: String,
    pub name: String,
    pub description: Option<String>,
    pub deleted: bool,
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub name: String,
    pub description: Option<String>,
    pub role_ids: Vec<Uuid>,
}

/// Login rows for a live user, ordered by the grouping key.
pub async fn login_rows(pool: &PgPool, username: &str) -> EngineResult<Vec<LoginRow>> {
    let query = r"
        SELECT users.id AS user_id,
               users.subject_id,
               users.username,
               users.password_hash,
               roles.id AS role_id,
               roles.name AS role_name
        FROM users
        JOIN subjects ON subjects.id = users.subject_id
        JOIN subject_roles ON subject_roles.subject_id = subjects.id
        JOIN roles ON roles.id = subject_roles.role_id
        WHERE users.username = $1
          AND subjects.deleted = false
          AND roles.deleted = false
        ORDER BY users.id
    ";
    let rows = sqlx::query(query)
        .bind(username)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| LoginRow {
            user_id: row.get("user_id"),
            subject_id: row.get("subject_id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            role_id: row.get("role_id"),
            role_name: row.get("role_name"),
        })
        .collect())
}

/// Create the subject row, the user row and the role assignments in one
/// transaction; a user without at least one role is never observable.
pub async fn create(pool: &PgPool, user: NewUser) -> EngineResult<InsertOutcome<Uuid>> {
    if user.role_ids.is_empty() {
        return Err(EngineError::configuration(
            "a new user requires at least one role",
        ));
    }

    let mut tx = pool.begin().await?;
    let subject_id = Uuid::new_v4();

    let query = "INSERT INTO subjects (id, name, description, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(subject_id)
        .bind(&user.name)
        .bind(&user.description)
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    let query =
        "INSERT INTO users (id, subject_id, username, password_hash) VALUES ($1, $2, $3, $4)";
    let inserted = sqlx::query(query)
        .bind(Uuid::new_v4())
        .bind(subject_id)
        .bind(&user.username)
        .bind(&user.password_hash)
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

    insert_subject_roles(&mut tx, subject_id, &user.role_ids).await?;

    tx.commit().await?;
    Ok(InsertOutcome::Created(subject_id))
}

pub async fn list(pool: &PgPool) -> EngineResult<Vec<UserSummary>> {
    let query = r"
        SELECT users.subject_id, users.username, subjects.name, subjects.description,
               subjects.deleted
        FROM users
        JOIN subjects ON subjects.id = users.subject_id
        ORDER BY users.username
    ";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| UserSummary {
            subject_id: row.get("subject_id"),
            username: row.get("username"),
            name: row.get("name"),
            description: row.get("description"),
            deleted: row.get("deleted"),
        })
        .collect())
}

pub async fn by_subject_id(pool: &PgPool, subject_id: Uuid) -> EngineResult<Option<UserSummary>> {
    let query = r"
        SELECT users.subject_id, users.username, subjects.name, subjects.description,
               subjects.deleted
        FROM users
        JOIN subjects ON subjects.id = users.subject_id
        WHERE users.subject_id = $1
    ";
    let row = sqlx::query(query)
        .bind(subject_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(row.map(|row| UserSummary {
        subject_id: row.get("subject_id"),
        username: row.get("username"),
        name: row.get("name"),
        description: row.get("description"),
        deleted: row.get("deleted"),
    }))
}

/// Replace the stored password hash.
pub async fn set_password_hash(
    pool: &PgPool,
    subject_id: Uuid,
    password_hash: &str,
) -> EngineResult<()> {
    let query = "UPDATE users SET password_hash = $2 WHERE subject_id = $1";
    let result = sqlx::query(query)
        .bind(subject_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("user"));
    }
    Ok(())
}

/// Soft-delete the shared subject record; authorization reads check the flag
/// on every path, so access stops on the next request.
pub async fn soft_delete(pool: &PgPool, subject_id: Uuid) -> EngineResult<()> {
    let query = "UPDATE subjects SET deleted = true WHERE id = $1";
    let result = sqlx::query(query)
        .bind(subject_id)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("subject"));
    }
    Ok(())
}

/// Diff the subject's role set against `role_ids`: stale join rows are
/// hard-deleted, missing ones inserted, all in one transaction.
pub async fn set_roles(pool: &PgPool, subject_id: Uuid, role_ids: &[Uuid]) -> EngineResult<()> {
    if role_ids.is_empty() {
        return Err(EngineError::configuration(
            "a subject requires at least one role",
        ));
    }

    let mut tx = pool.begin().await?;

    let query = "SELECT role_id FROM subject_roles WHERE subject_id = $1";
    let existing: Vec<Uuid> = sqlx::query(query)
        .bind(subject_id)
        .fetch_all(&mut *tx)
        .instrument(query_span("SELECT", query))
        .await?
        .into_iter()
        .map(|row| row.get("role_id"))
        .collect();

    let stale: Vec<Uuid> = existing
        .iter()
        .copied()
        .filter(|role_id| !role_ids.contains(role_id))
        .collect();
    if !stale.is_empty() {
        let query = "DELETE FROM subject_roles WHERE subject_id = $1 AND role_id = ANY($2)";
        sqlx::query(query)
            .bind(subject_id)
            .bind(&stale)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", query))
            .await?;
    }

    let missing: Vec<Uuid> = role_ids
        .iter()
        .copied()
        .filter(|role_id| !existing.contains(role_id))
        .collect();
    insert_subject_roles(&mut tx, subject_id, &missing).await?;

    tx.commit().await?;
    Ok(())
}

pub(crate) async fn insert_subject_roles(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    subject_id: Uuid,
    role_ids: &[Uuid],
) -> EngineResult<()> {
    let query = "INSERT INTO subject_roles (id, subject_id, role_id) VALUES ($1, $2, $3)";
    for role_id in role_ids {
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(subject_id)
            .bind(role_id)
            .execute(&mut **tx)
            .instrument(query_span("INSERT", query))
            .await?;
    }
    Ok(())
}
