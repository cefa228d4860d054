//! Permission-graph joins consumed by the denormalizer.

use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::denorm::PermissionRow;
use crate::error::EngineResult;

/// Flat subject permission rows, ordered by the grouping keys the
/// denormalizer expects.
///
/// Deleted subjects, permissions and resources are filtered here; deleted
/// roles are kept in the stream (flagged) and skipped by the tree builder.
pub async fn subject_permission_rows(
    pool: &PgPool,
    subject_id: Uuid,
) -> EngineResult<Vec<PermissionRow>> {
    let query = r"
        SELECT subjects.id AS subject_id,
               roles.id AS role_id,
               roles.name AS role_name,
               roles.deleted AS role_deleted,
               resources.name AS resource,
               permissions.action
        FROM subjects
        JOIN subject_roles ON subject_roles.subject_id = subjects.id
        JOIN roles ON roles.id = subject_roles.role_id
        JOIN role_permissions ON role_permissions.role_id = roles.id
        JOIN permissions ON permissions.id = role_permissions.permission_id
        JOIN resources ON resources.id = permissions.resource_id
        WHERE subjects.id = $1
          AND subjects.deleted = false
          AND permissions.deleted = false
          AND resources.deleted = false
        ORDER BY subjects.id, roles.id, resources.name
    ";
    let rows = sqlx::query(query)
        .bind(subject_id)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| PermissionRow {
            subject_id: row.get("subject_id"),
            role_id: row.get("role_id"),
            role_name: row.get("role_name"),
            role_deleted: row.get("role_deleted"),
            resource: row.get("resource"),
            action: row.get("action"),
        })
        .collect())
}

/// Ids of the live permissions attached to a resource, keyed by action.
pub async fn ids_by_resource(
    pool: &PgPool,
    resource_id: Uuid,
) -> EngineResult<Vec<(Uuid, String)>> {
    let query = r"
        SELECT id, action
        FROM permissions
        WHERE resource_id = $1 AND deleted = false
        ORDER BY action
    ";
    let rows = sqlx::query(query)
        .bind(resource_id)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("id"), row.get("action")))
        .collect())
}
