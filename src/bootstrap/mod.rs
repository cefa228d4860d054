//! Startup schema audit and destructive rebuild + reseed.
//!
//! The bootstrap is an exclusive one-shot phase: it must run to completion
//! before any guarded route accepts traffic, and any failure is fatal to
//! startup. There is deliberately no incremental-migration path; a single
//! missing table or mismatched column rebuilds the entire schema.

use secrecy::SecretString;
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use tracing::{Instrument, debug, info, warn};

mod schema;
mod seed;

pub use schema::{ColumnSpec, EXPECTED, TableSpec};
pub use seed::{ADMIN_ROLE, ADMIN_USERNAME, SeededCredentials, seed, write_credentials_file};

use crate::error::{EngineError, EngineResult};
use crate::store::query_span;

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Extra system resources seeded next to the global wildcard resource,
    /// each with the standard permission set.
    pub system_resources: Vec<String>,
    /// Master secret for encrypting the generated admin client secret.
    pub master_secret: SecretString,
    /// Where the one-time admin credentials artifact is written.
    pub credentials_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOutcome {
    pub rebuilt: bool,
    pub seeded: bool,
}

/// Result of comparing the live schema against the expected descriptor.
#[derive(Debug, Default)]
pub struct SchemaAudit {
    pub missing_tables: Vec<String>,
    /// `table.column` entries that are absent or whose descriptor differs.
    pub mismatched_columns: Vec<String>,
}

impl SchemaAudit {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.missing_tables.is_empty() && self.mismatched_columns.is_empty()
    }
}

/// Audit every expected table and column against `information_schema`.
///
/// # Errors
/// Store errors reading the catalog are configuration-fatal for startup.
pub async fn audit(pool: &PgPool) -> EngineResult<SchemaAudit> {
    let mut report = SchemaAudit::default();

    for table in EXPECTED {
        if !table_exists(pool, table.name).await? {
            report.missing_tables.push(table.name.to_string());
            continue;
        }

        let live = live_columns(pool, table.name).await?;
        for expected in table.columns {
            let matched = live.iter().any(|column| {
                column.name == expected.name
                    && column.data_type == expected.data_type
                    && column.max_length == expected.max_length
                    && column.nullable == expected.nullable
            });
            if !matched {
                report
                    .mismatched_columns
                    .push(format!("{}.{}", table.name, expected.name));
            }
        }
    }

    Ok(report)
}

/// Run the full bootstrap: audit, rebuild + reseed on drift, or reseed alone
/// when the schema is fine but the admin user is gone.
///
/// # Errors
/// Any failing step aborts the bootstrap; the engine must not serve guarded
/// traffic against an inconsistent schema.
pub async fn run(pool: &PgPool, config: &BootstrapConfig) -> EngineResult<BootstrapOutcome> {
    let report = audit(pool).await?;

    if !report.is_consistent() {
        warn!(
            missing_tables = ?report.missing_tables,
            mismatched_columns = ?report.mismatched_columns,
            "schema drift detected, performing destructive rebuild"
        );
        rebuild(pool).await?;
        let creds = seed::seed(pool, config).await?;
        seed::write_credentials_file(&config.credentials_path, &creds)?;
        info!(
            path = %config.credentials_path.display(),
            "schema rebuilt, admin credentials written"
        );
        return Ok(BootstrapOutcome {
            rebuilt: true,
            seeded: true,
        });
    }

    // Schema is consistent; the seeding trigger is a separate, cheaper check.
    if admin_user_exists(pool).await? {
        debug!("schema consistent, baseline data present");
        Ok(BootstrapOutcome {
            rebuilt: false,
            seeded: false,
        })
    } else {
        info!("schema consistent but admin user missing, reseeding baseline data");
        let creds = seed::seed(pool, config).await?;
        seed::write_credentials_file(&config.credentials_path, &creds)?;
        info!(
            path = %config.credentials_path.display(),
            "baseline data reseeded, admin credentials written"
        );
        Ok(BootstrapOutcome {
            rebuilt: false,
            seeded: true,
        })
    }
}

/// Drop all known tables in reverse-dependency order, then recreate them in
/// dependency order with their constraints and indexes.
pub async fn rebuild(pool: &PgPool) -> EngineResult<()> {
    for table in EXPECTED.iter().rev() {
        let ddl = table.drop_ddl();
        sqlx::query(&ddl)
            .execute(pool)
            .instrument(query_span("DROP", &ddl))
            .await?;
    }

    for table in EXPECTED {
        let ddl = table.create_ddl();
        sqlx::query(&ddl)
            .execute(pool)
            .instrument(query_span("CREATE", &ddl))
            .await?;
        for statement in table.post_create {
            sqlx::query(statement)
                .execute(pool)
                .instrument(query_span("CREATE", statement))
                .await?;
        }
    }

    Ok(())
}

async fn table_exists(pool: &PgPool, table_name: &str) -> EngineResult<bool> {
    let query = r"
        SELECT EXISTS (
            SELECT 1 FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        ) AS present
    ";
    let row = sqlx::query(query)
        .bind(table_name)
        .fetch_one(pool)
        .instrument(query_span("SELECT", query))
        .await?;
    Ok(row.get("present"))
}

#[derive(Debug)]
struct LiveColumn {
    name: String,
    data_type: String,
    max_length: Option<i32>,
    nullable: bool,
}

async fn live_columns(pool: &PgPool, table_name: &str) -> EngineResult<Vec<LiveColumn>> {
    let query = r"
        SELECT column_name, data_type, character_maximum_length, is_nullable
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
    ";
    let rows = sqlx::query(query)
        .bind(table_name)
        .fetch_all(pool)
        .instrument(query_span("SELECT", query))
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| LiveColumn {
            name: row.get("column_name"),
            data_type: row.get("data_type"),
            max_length: row.get("character_maximum_length"),
            nullable: row.get::<String, _>("is_nullable") == "YES",
        })
        .collect())
}

/// The reseed trigger: does a live admin user exist? Awaited and checked,
/// separate from the schema-consistency audit.
pub async fn admin_user_exists(pool: &PgPool) -> EngineResult<bool> {
    let query = r"
        SELECT EXISTS (
            SELECT 1
            FROM users
            JOIN subjects ON subjects.id = users.subject_id
            WHERE users.username = $1 AND subjects.deleted = false
        ) AS present
    ";
    let row = sqlx::query(query)
        .bind(ADMIN_USERNAME)
        .fetch_one(pool)
        .instrument(query_span("SELECT", query))
        .await?;
    Ok(row.get("present"))
}

// Surfacing audit problems as a configuration error keeps the taxonomy
// accurate when callers want to fail loudly instead of rebuilding.
impl SchemaAudit {
    /// # Errors
    /// Returns a configuration error describing the drift when inconsistent.
    pub fn into_result(self) -> EngineResult<()> {
        if self.is_consistent() {
            return Ok(());
        }
        Err(EngineError::configuration(format!(
            "schema drift: missing tables {:?}, mismatched columns {:?}",
            self.missing_tables, self.mismatched_columns
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_audit_is_consistent() {
        let report = SchemaAudit::default();
        assert!(report.is_consistent());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn any_missing_table_marks_rebuild() {
        let report = SchemaAudit {
            missing_tables: vec!["roles".to_string()],
            mismatched_columns: Vec::new(),
        };
        assert!(!report.is_consistent());
    }

    #[test]
    fn any_column_mismatch_marks_rebuild() {
        let report = SchemaAudit {
            missing_tables: Vec::new(),
            mismatched_columns: vec!["users.password_hash".to_string()],
        };
        assert!(!report.is_consistent());
        let err = report.into_result().expect_err("inconsistent");
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(err.to_string().contains("users.password_hash"));
    }
}
