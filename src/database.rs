//! Table installation.
//!
//! Tables are declared as a name plus a column definition body and created on
//! demand. Installation checks for an existing table by name first, so it is
//! safe to run on every activation. There is no versioning: a table that
//! exists is left exactly as it is.

use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::Text;
use indoc::formatdoc;
use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid table name '{0}'")]
    InvalidName(String),

    #[error("invalid collation '{0}'")]
    InvalidCollation(String),

    #[error("failed to install table '{table}': {source}")]
    Install {
        table: String,
        #[source]
        source: diesel::result::Error,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: String,
}

/// Tables owned by the books plugin.
pub fn tables(collation: &str) -> Vec<TableDefinition> {
    vec![TableDefinition {
        name: crate::BOOK_INFO_TABLE.into(),
        columns: formatdoc! {"
            id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
            post_id INTEGER NOT NULL,
            isbn VARCHAR({max}) NOT NULL COLLATE {collation}",
            max = crate::ISBN_MAX_LENGTH,
            collation = collation,
        },
    }]
}

/// Tables of the content store the plugin runs against: posts, their
/// metadata, taxonomy terms and per-user settings.
pub fn host_tables(collation: &str) -> Vec<TableDefinition> {
    vec![
        TableDefinition {
            name: "posts".into(),
            columns: formatdoc! {"
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                post_author INTEGER NOT NULL DEFAULT 0,
                post_title TEXT NOT NULL DEFAULT '' COLLATE {collation},
                post_content TEXT NOT NULL DEFAULT '',
                post_excerpt TEXT NOT NULL DEFAULT '',
                post_status VARCHAR(20) NOT NULL DEFAULT 'publish',
                post_type VARCHAR(20) NOT NULL DEFAULT 'post',
                post_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                post_modified TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP",
                collation = collation,
            },
        },
        TableDefinition {
            name: "postmeta".into(),
            columns: formatdoc! {"
                meta_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                post_id INTEGER NOT NULL DEFAULT 0,
                meta_key VARCHAR(255) NOT NULL,
                meta_value TEXT NOT NULL DEFAULT ''"
            },
        },
        TableDefinition {
            name: "terms".into(),
            columns: formatdoc! {"
                term_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                taxonomy VARCHAR(32) NOT NULL,
                name VARCHAR(200) NOT NULL COLLATE {collation},
                slug VARCHAR(200) NOT NULL,
                UNIQUE (taxonomy, slug)",
                collation = collation,
            },
        },
        TableDefinition {
            name: "term_relationships".into(),
            columns: formatdoc! {"
                object_id INTEGER NOT NULL,
                term_id INTEGER NOT NULL,
                PRIMARY KEY (object_id, term_id)"
            },
        },
        TableDefinition {
            name: "usermeta".into(),
            columns: formatdoc! {"
                umeta_id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                user_id INTEGER NOT NULL,
                meta_key VARCHAR(255) NOT NULL,
                meta_value TEXT NOT NULL DEFAULT ''"
            },
        },
    ]
}

#[derive(QueryableByName)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn table_exists(conn: &mut SqliteConnection, name: &str) -> Result<bool, diesel::result::Error> {
    let found = sql_query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind::<Text, _>(name)
        .get_result::<TableName>(conn)
        .optional()?;
    Ok(found.map(|t| t.name == name).unwrap_or(false))
}

/// Creates every table in `definitions` that does not exist yet.
///
/// Returns the names of the tables that were created.
pub fn ensure_schema(
    conn: &mut SqliteConnection,
    definitions: &[TableDefinition],
) -> Result<Vec<String>, SchemaError> {
    let mut created = vec![];
    for table in definitions {
        if !is_identifier(&table.name) {
            return Err(SchemaError::InvalidName(table.name.clone()));
        }

        let install_err = |source| SchemaError::Install {
            table: table.name.clone(),
            source,
        };

        if table_exists(conn, &table.name).map_err(install_err)? {
            debug!("table {} already present, skipping", table.name);
            continue;
        }

        let ddl = format!("CREATE TABLE {} (\n{}\n)", table.name, table.columns);
        sql_query(ddl).execute(conn).map_err(install_err)?;
        info!("created table {}", table.name);
        created.push(table.name.clone());
    }

    Ok(created)
}

fn check_collation(collation: &str) -> Result<(), SchemaError> {
    if is_identifier(collation) {
        Ok(())
    } else {
        Err(SchemaError::InvalidCollation(collation.into()))
    }
}

pub fn install_host_tables(conn: &mut SqliteConnection, collation: &str) -> Result<Vec<String>, SchemaError> {
    check_collation(collation)?;
    ensure_schema(conn, &host_tables(collation))
}

pub fn install_plugin_tables(conn: &mut SqliteConnection, collation: &str) -> Result<Vec<String>, SchemaError> {
    check_collation(collation)?;
    ensure_schema(conn, &tables(collation))
}

/// Installs host and plugin tables with the configured collation.
pub fn install_all(conn: &mut SqliteConnection, collation: &str) -> Result<Vec<String>, SchemaError> {
    let mut created = install_host_tables(conn, collation)?;
    created.extend(install_plugin_tables(conn, collation)?);
    Ok(created)
}

#[cfg(test)]
mod test {
    use super::{ensure_schema, host_tables, install_all, table_exists, tables, TableDefinition};
    use diesel::prelude::*;

    fn conn() -> SqliteConnection {
        SqliteConnection::establish(":memory:").unwrap()
    }

    #[test]
    fn it_creates_missing_tables() {
        let mut conn = conn();
        assert!(!table_exists(&mut conn, "book_info").unwrap());

        let created = ensure_schema(&mut conn, &tables("BINARY")).unwrap();
        assert_eq!(created, vec!["book_info".to_string()]);
        assert!(table_exists(&mut conn, "book_info").unwrap());
    }

    #[test]
    fn it_is_idempotent() {
        let mut conn = conn();
        ensure_schema(&mut conn, &tables("BINARY")).unwrap();
        let created = ensure_schema(&mut conn, &tables("BINARY")).unwrap();
        assert!(created.is_empty());

        #[derive(QueryableByName)]
        struct Count {
            #[diesel(sql_type = diesel::sql_types::BigInt)]
            n: i64,
        }
        let count = diesel::sql_query(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = 'book_info'",
        )
        .get_result::<Count>(&mut conn)
        .unwrap();
        assert_eq!(count.n, 1);
    }

    #[test]
    fn it_installs_host_and_plugin_tables() {
        let mut conn = conn();
        let created = install_all(&mut conn, "NOCASE").unwrap();
        assert_eq!(created.len(), host_tables("NOCASE").len() + 1);
        for name in ["posts", "postmeta", "terms", "term_relationships", "usermeta", "book_info"] {
            assert!(table_exists(&mut conn, name).unwrap(), "{} missing", name);
        }
        assert!(install_all(&mut conn, "NOCASE").unwrap().is_empty());
    }

    #[test]
    fn it_rejects_bad_identifiers() {
        let mut conn = conn();
        let bad = TableDefinition {
            name: "books; DROP TABLE posts".into(),
            columns: "id INTEGER".into(),
        };
        assert!(ensure_schema(&mut conn, &[bad]).is_err());
        assert!(install_all(&mut conn, "BINARY; --").is_err());
    }
}
