//! Static expected-schema descriptor and the DDL derived from it.
//!
//! `EXPECTED` is the single source of truth: the audit compares live column
//! metadata against it, and the rebuild generates `CREATE TABLE` statements
//! from it. Tables are listed in dependency order; drops run in reverse.

/// Expected column, phrased in `information_schema.columns` terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// `information_schema.columns.data_type` value.
    pub data_type: &'static str,
    /// `character_maximum_length`; `None` for non-character types.
    pub max_length: Option<i32>,
    pub nullable: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    /// Table-level clauses appended to the generated `CREATE TABLE`.
    pub constraints: &'static [&'static str],
    /// Statements executed after the table exists (indexes).
    pub post_create: &'static [&'static str],
}

const fn id() -> ColumnSpec {
    ColumnSpec {
        name: "id",
        data_type: "uuid",
        max_length: None,
        nullable: false,
    }
}

const fn uuid_col(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        data_type: "uuid",
        max_length: None,
        nullable: false,
    }
}

const fn varchar(name: &'static str, max_length: i32, nullable: bool) -> ColumnSpec {
    ColumnSpec {
        name,
        data_type: "character varying",
        max_length: Some(max_length),
        nullable,
    }
}

const fn flag(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        data_type: "boolean",
        max_length: None,
        nullable: false,
    }
}

pub const EXPECTED: &[TableSpec] = &[
    TableSpec {
        name: "applications",
        columns: &[
            id(),
            varchar("name", 100, false),
            varchar("description", 255, true),
            flag("deleted"),
        ],
        constraints: &[],
        post_create: &[],
    },
    TableSpec {
        name: "resources",
        columns: &[
            id(),
            uuid_col("application_id"),
            varchar("name", 100, false),
            flag("deleted"),
        ],
        constraints: &["FOREIGN KEY (application_id) REFERENCES applications (id)"],
        post_create: &[],
    },
    TableSpec {
        name: "subjects",
        columns: &[
            id(),
            varchar("name", 100, false),
            varchar("description", 255, true),
            flag("deleted"),
        ],
        constraints: &[],
        post_create: &[],
    },
    TableSpec {
        name: "users",
        columns: &[
            id(),
            uuid_col("subject_id"),
            varchar("username", 100, false),
            varchar("password_hash", 255, false),
        ],
        constraints: &[
            "FOREIGN KEY (subject_id) REFERENCES subjects (id)",
            "UNIQUE (username)",
        ],
        post_create: &[],
    },
    TableSpec {
        name: "clients",
        columns: &[
            id(),
            uuid_col("subject_id"),
            varchar("client_id", 100, false),
            varchar("secret_enc", 512, false),
            varchar("access_token_hash", 255, true),
            flag("revoked"),
        ],
        constraints: &[
            "FOREIGN KEY (subject_id) REFERENCES subjects (id)",
            "UNIQUE (client_id)",
        ],
        post_create: &[],
    },
    TableSpec {
        name: "permissions",
        columns: &[
            id(),
            uuid_col("resource_id"),
            varchar("action", 50, false),
            flag("deleted"),
        ],
        constraints: &["FOREIGN KEY (resource_id) REFERENCES resources (id)"],
        // (resource, action) unique while not deleted.
        post_create: &["CREATE UNIQUE INDEX permissions_resource_action_live \
             ON permissions (resource_id, action) WHERE NOT deleted"],
    },
    TableSpec {
        name: "roles",
        columns: &[
            id(),
            varchar("name", 100, false),
            varchar("description", 255, true),
            flag("deleted"),
        ],
        constraints: &[],
        post_create: &[],
    },
    TableSpec {
        name: "subject_roles",
        columns: &[id(), uuid_col("subject_id"), uuid_col("role_id")],
        constraints: &[
            "FOREIGN KEY (subject_id) REFERENCES subjects (id)",
            "FOREIGN KEY (role_id) REFERENCES roles (id)",
            "UNIQUE (subject_id, role_id)",
        ],
        post_create: &[],
    },
    TableSpec {
        name: "role_permissions",
        columns: &[id(), uuid_col("role_id"), uuid_col("permission_id")],
        constraints: &[
            "FOREIGN KEY (role_id) REFERENCES roles (id)",
            "FOREIGN KEY (permission_id) REFERENCES permissions (id)",
            "UNIQUE (role_id, permission_id)",
        ],
        post_create: &[],
    },
];

impl ColumnSpec {
    fn ddl_type(&self) -> String {
        match self.data_type {
            "character varying" => format!("varchar({})", self.max_length.unwrap_or(255)),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn ddl(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.ddl_type());
        if self.name == "id" {
            sql.push_str(" PRIMARY KEY");
        } else if !self.nullable {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

impl TableSpec {
    #[must_use]
    pub fn create_ddl(&self) -> String {
        let mut clauses: Vec<String> = self.columns.iter().map(ColumnSpec::ddl).collect();
        clauses.extend(self.constraints.iter().map(ToString::to_string));
        format!("CREATE TABLE {} ({})", self.name, clauses.join(", "))
    }

    #[must_use]
    pub fn drop_ddl(&self) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_lists_all_engine_tables_in_dependency_order() {
        let names: Vec<&str> = EXPECTED.iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "applications",
                "resources",
                "subjects",
                "users",
                "clients",
                "permissions",
                "roles",
                "subject_roles",
                "role_permissions",
            ]
        );
    }

    #[test]
    fn every_table_leads_with_a_uuid_primary_key() {
        for table in EXPECTED {
            let first = table.columns.first().expect(table.name);
            assert_eq!(first.name, "id", "{}", table.name);
            assert_eq!(first.data_type, "uuid", "{}", table.name);
            assert!(!first.nullable, "{}", table.name);
        }
    }

    #[test]
    fn column_ddl_renders_types_and_nullability() {
        assert_eq!(id().ddl(), "id uuid PRIMARY KEY");
        assert_eq!(
            varchar("name", 100, false).ddl(),
            "name varchar(100) NOT NULL"
        );
        assert_eq!(varchar("description", 255, true).ddl(), "description varchar(255)");
        assert_eq!(flag("deleted").ddl(), "deleted boolean NOT NULL");
    }

    #[test]
    fn create_ddl_includes_constraints() {
        let users = EXPECTED
            .iter()
            .find(|t| t.name == "users")
            .expect("users table");
        let ddl = users.create_ddl();
        assert!(ddl.starts_with("CREATE TABLE users ("));
        assert!(ddl.contains("UNIQUE (username)"));
        assert!(ddl.contains("REFERENCES subjects (id)"));
    }

    #[test]
    fn drop_ddl_cascades() {
        assert_eq!(
            EXPECTED[0].drop_ddl(),
            "DROP TABLE IF EXISTS applications CASCADE"
        );
    }

    #[test]
    fn permissions_carry_live_uniqueness_index() {
        let permissions = EXPECTED
            .iter()
            .find(|t| t.name == "permissions")
            .expect("permissions table");
        assert_eq!(permissions.post_create.len(), 1);
        assert!(permissions.post_create[0].contains("WHERE NOT deleted"));
    }

    #[test]
    fn foreign_keys_only_reference_earlier_tables() {
        // Creation order must satisfy dependencies.
        for (index, table) in EXPECTED.iter().enumerate() {
            for constraint in table.constraints {
                if let Some(rest) = constraint.split("REFERENCES ").nth(1) {
                    let referenced = rest.split(' ').next().expect("table name");
                    let position = EXPECTED
                        .iter()
                        .position(|t| t.name == referenced)
                        .unwrap_or(usize::MAX);
                    assert!(position < index, "{} references {referenced}", table.name);
                }
            }
        }
    }
}
