//! Role storage: creation with its permission set, permission-set diffs and
//! soft deletes.

use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::denorm::RolePermissionRow;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct RoleRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deleted: bool,
}

/// Create the role and its permission grants in one transaction.
pub async fn create(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
    permission_ids: &[Uuid],
) -> EngineResult<Uuid> {
    let mut tx = pool.begin().await?;
    let role_id = Uuid::new_v4();

    let query = "INSERT INTO roles (id, name, description, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(role_id)
        .bind(name)
        .bind(description)
        .execute(&mut *tx)
        .instrument(query_span("INSERT", query))
        .await?;

    insert_role_permissions(&mut tx, role_id, permission_ids).await?;

    tx.commit().await?;
    Ok(role_id)
}

pub async fn by_id(pool: &PgPool, role_id: Uuid) -> EngineResult<Option<RoleRecord>> {
    let query = "SELECT id, name, description, deleted FROM roles WHERE id = $1";
    let row = sqlx::query(query)
        .bind(role_id)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(row.map(|row| RoleRecord {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        deleted: row.get("deleted"),
    }))
}

pub async fn list(pool: &PgPool) -> EngineResult<Vec<RoleRecord>> {
    let query = "SELECT id, name, description, deleted FROM roles ORDER BY name";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| RoleRecord {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            deleted: row.get("deleted"),
        })
        .collect())
}

pub async fn update(
    pool: &PgPool,
    role_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> EngineResult<()> {
    let query = "UPDATE roles SET name = $2, description = $3 WHERE id = $1";
    let result = sqlx::query(query)
        .bind(role_id)
        .bind(name)
        .bind(description)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("role"));
    }
    Ok(())
}

/// Soft-delete: the role stops granting permissions on the next guard
/// evaluation; its join rows stay until a later diff removes them.
pub async fn soft_delete(pool: &PgPool, role_id: Uuid) -> EngineResult<()> {
    let query = "UPDATE roles SET deleted = true WHERE id = $1";
    let result = sqlx::query(query)
        .bind(role_id)
        .execute(pool)
        .instrument(query_span("UPDATE", query))
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("role"));
    }
    Ok(())
}

/// Diff the role's permission set against `permission_ids`: stale join rows
/// are hard-deleted, missing ones inserted, all in one transaction.
pub async fn set_permissions(
    pool: &PgPool,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> EngineResult<()> {
    let mut tx = pool.begin().await?;

    let query = "SELECT permission_id FROM role_permissions WHERE role_id = $1";
    let existing: Vec<Uuid> = sqlx::query(query)
        .bind(role_id)
        .fetch_all(&mut *tx)
        .instrument(query_span("SELECT", query))
        .await?
        .into_iter()
        .map(|row| row.get("permission_id"))
        .collect();

    let stale: Vec<Uuid> = existing
        .iter()
        .copied()
        .filter(|id| !permission_ids.contains(id))
        .collect();
    if !stale.is_empty() {
        let query = "DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = ANY($2)";
        sqlx::query(query)
            .bind(role_id)
            .bind(&stale)
            .execute(&mut *tx)
            .instrument(query_span("DELETE", query))
            .await?;
    }

    let missing: Vec<Uuid> = permission_ids
        .iter()
        .copied()
        .filter(|id| !existing.contains(id))
        .collect();
    insert_role_permissions(&mut tx, role_id, &missing).await?;

    tx.commit().await?;
    Ok(())
}

/// Flat role permission rows for the role listing tree, live rows only.
pub async fn permission_rows(pool: &PgPool) -> EngineResult<Vec<RolePermissionRow>> {
    let query = r"
        SELECT roles.id AS role_id,
               roles.name AS role_name,
               resources.name AS resource,
               permissions.action
        FROM roles
        JOIN role_permissions ON role_permissions.role_id = roles.id
        JOIN permissions ON permissions.id = role_permissions.permission_id
        JOIN resources ON resources.id = permissions.resource_id
        WHERE roles.deleted = false
          AND permissions.deleted = false
          AND resources.deleted = false
        ORDER BY roles.id, resources.name
    ";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| RolePermissionRow {
            role_id: row.get("role_id"),
            role_name: row.get("role_name"),
            resource: row.get("resource"),
            action: row.get("action"),
        })
        .collect())
}

pub(crate) async fn insert_role_permissions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    role_id: Uuid,
    permission_ids: &[Uuid],
) -> EngineResult<()> {
    let query = "INSERT INTO role_permissions (id, role_id, permission_id) VALUES ($1, $2, $3)";
    for permission_id in permission_ids {
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut **tx)
            .instrument(query_span("INSERT", query))
            .await?;
    }
    Ok(())
}
