//! Resource storage. A resource owns a fixed initial permission set created
//! atomically with it.

use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::denorm::ResourcePermissionRow;
use crate::error::{EngineError, EngineResult};

/// Standard permission set granted to every new resource.
pub const STANDARD_ACTIONS: [&str; 5] = ["*", "create", "update", "delete", "select"];

#[derive(Debug, Clone)]
pub struct ResourceRecord {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub deleted: bool,
}

/// Create a resource together with its standard permissions, atomically.
pub async fn create(pool: &PgPool, application_id: Uuid, name: &str) -> EngineResult<Uuid> {
    let mut tx = pool.begin().await?;
    let resource_id = create_in_tx(&mut tx, application_id, name).await?;
    tx.commit().await?;
    Ok(resource_id)
}

/// Transaction-scoped variant used by the bootstrap seeding step.
pub(crate) async fn create_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    application_id: Uuid,
    name: &str,
) -> EngineResult<Uuid> {
    let resource_id = Uuid::new_v4();

    let query =
        "INSERT INTO resources (id, application_id, name, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(resource_id)
        .bind(application_id)
        .bind(name)
        .execute(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await?;

    let query = "INSERT INTO permissions (id, resource_id, action, deleted) VALUES ($1, $2, $3, false)";
    for action in STANDARD_ACTIONS {
        sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(resource_id)
            .bind(action)
            .execute(&mut **tx)
            .instrument(query_span("INSERT", query))
            .await?;
    }

    Ok(resource_id)
}

pub async fn by_name(pool: &PgPool, name: &str) -> EngineResult<Option<ResourceRecord>> {
    let query = r"
        SELECT id, application_id, name, deleted
        FROM resources
        WHERE name = $1 AND deleted = false
    ";
    let row = sqlx::query(query)
        .bind(name)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(row.map(|row| ResourceRecord {
        id: row.get("id"),
        application_id: row.get("application_id"),
        name: row.get("name"),
        deleted: row.get("deleted"),
    }))
}

/// Soft-delete the resource and its permissions together; a deleted
/// resource must stop granting access on the next request.
pub async fn soft_delete(pool: &PgPool, resource_id: Uuid) -> EngineResult<()> {
    let mut tx = pool.begin().await?;

    let query = "UPDATE resources SET deleted = true WHERE id = $1";
    let result = sqlx::query(query)
        .bind(resource_id)
        .execute(&mut *tx)
        .instrument(query_span("UPDATE", query))
        .await?;

    if result.rows_affected() == 0 {
        return Err(EngineError::not_found("resource"));
    }

    let query = "UPDATE permissions SET deleted = true WHERE resource_id = $1";
    sqlx::query(query)
        .bind(resource_id)
        .execute(&mut *tx)
        .instrument(query_span("UPDATE", query))
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Flat resource permission rows for the resource listing tree.
pub async fn permission_rows(pool: &PgPool) -> EngineResult<Vec<ResourcePermissionRow>> {
    let query = r"
        SELECT resources.id AS resource_id,
               resources.name AS resource,
               permissions.action
        FROM resources
        JOIN permissions ON permissions.resource_id = resources.id
        WHERE resources.deleted = false
          AND permissions.deleted = false
        ORDER BY resources.id, permissions.action
    ";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ResourcePermissionRow {
            resource_id: row.get("resource_id"),
            resource: row.get("resource"),
            action: row.get("action"),
        })
        .collect())
}
