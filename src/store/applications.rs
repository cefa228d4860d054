//! Application storage: the top-level namespace grouping resources.

use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::query_span;
use crate::error::EngineResult;

#[derive(Debug, Clone)]
pub struct ApplicationRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub deleted: bool,
}

pub async fn create(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
) -> EngineResult<Uuid> {
    let mut tx = pool.begin().await?;
    let id = create_in_tx(&mut tx, name, description).await?;
    tx.commit().await?;
    Ok(id)
}

pub(crate) async fn create_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    name: &str,
    description: Option<&str>,
) -> EngineResult<Uuid> {
    let id = Uuid::new_v4();
    let query =
        "INSERT INTO applications (id, name, description, deleted) VALUES ($1, $2, $3, false)";
    sqlx::query(query)
        .bind(id)
        .bind(name)
        .bind(description)
        .execute(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await?;
    Ok(id)
}

pub async fn list(pool: &PgPool) -> EngineResult<Vec<ApplicationRecord>> {
    let query = r"
        SELECT id, name, description, deleted
        FROM applications
        WHERE deleted = false
        ORDER BY name
    ";
    let rows = sqlx::query(query)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| ApplicationRecord {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            deleted: row.get("deleted"),
        })
        .collect())
}

/// First application by insertion-independent order; the bootstrap seeds a
/// single root application, so this is the default namespace for new
/// resources when the caller does not name one.
pub async fn first(pool: &PgPool) -> EngineResult<Option<ApplicationRecord>> {
    let query = r"
        SELECT id, name, description, deleted
        FROM applications
        WHERE deleted = false
        ORDER BY name
        LIMIT 1
    ";
    let row = sqlx::query(query)
        .fetch_optional(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(row.map(|row| ApplicationRecord {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        deleted: row.get("deleted"),
    }))
}
