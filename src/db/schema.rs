//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::ParamError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), ParamError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, ParamError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| ParamError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), ParamError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| ParamError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| ParamError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), ParamError> {
    conn.execute_batch(HIERARCHY_SCHEMA)
        .map_err(|e| ParamError::Internal(format!("Failed to create hierarchy tables: {}", e)))?;

    conn.execute_batch(DEFINITIONS_SCHEMA)
        .map_err(|e| ParamError::Internal(format!("Failed to create definition tables: {}", e)))?;

    conn.execute_batch(BINDINGS_SCHEMA)
        .map_err(|e| ParamError::Internal(format!("Failed to create binding tables: {}", e)))?;

    conn.execute_batch(TRANSLATIONS_SCHEMA)
        .map_err(|e| ParamError::Internal(format!("Failed to create translation table: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| ParamError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), ParamError> {
    match from_version {
        // 1 -> 2 goes here once the schema changes
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Organizational tree (maintained by the hierarchy service)
const HIERARCHY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS hierarchy_nodes (
    hierarchy_id INTEGER PRIMARY KEY NOT NULL,
    parent_id INTEGER,
    -- Materialized path: ancestor ids joined by '.', ending with hierarchy_id
    hierarchy_path TEXT NOT NULL,
    node_type_id INTEGER NOT NULL,
    hierarchy_status INTEGER NOT NULL DEFAULT 1
);
"#;

/// Static parameter catalog
const DEFINITIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS parameter_categories (
    category_id INTEGER PRIMARY KEY NOT NULL,
    category_name TEXT NOT NULL,
    category_description TEXT
);

CREATE TABLE IF NOT EXISTS system_parameters (
    parameter_id INTEGER PRIMARY KEY NOT NULL,
    parameter_name TEXT NOT NULL,
    parameter_description TEXT,
    category_id INTEGER NOT NULL REFERENCES parameter_categories(category_id),
    max_properties INTEGER NOT NULL DEFAULT 1,
    status INTEGER NOT NULL DEFAULT 1
);

-- Node types a parameter applies to
CREATE TABLE IF NOT EXISTS parameter_node_types (
    parameter_id INTEGER NOT NULL REFERENCES system_parameters(parameter_id) ON DELETE CASCADE,
    node_type_id INTEGER NOT NULL,
    PRIMARY KEY (parameter_id, node_type_id)
);

CREATE TABLE IF NOT EXISTS parameter_properties (
    property_id INTEGER PRIMARY KEY NOT NULL,
    parameter_id INTEGER NOT NULL REFERENCES system_parameters(parameter_id) ON DELETE CASCADE,
    property_code TEXT,
    -- JSON array of attribute schema elements
    property_attributes TEXT NOT NULL DEFAULT '[]'
);
"#;

/// Per-node bindings and their values
const BINDINGS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS hierarchy_parameters (
    hierarchy_parameter_id INTEGER PRIMARY KEY AUTOINCREMENT,
    hierarchy_id INTEGER NOT NULL,
    parameter_id INTEGER NOT NULL,
    property_id INTEGER NOT NULL,
    status INTEGER NOT NULL DEFAULT 1,
    propagate_to_children INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT,
    UNIQUE (hierarchy_id, parameter_id, property_id)
);

CREATE TABLE IF NOT EXISTS hierarchy_parameter_values (
    hierarchy_property_id INTEGER PRIMARY KEY AUTOINCREMENT,
    hierarchy_parameter_id INTEGER NOT NULL
        REFERENCES hierarchy_parameters(hierarchy_parameter_id) ON DELETE CASCADE,
    hierarchy_attributes TEXT NOT NULL,
    property_code TEXT,
    status INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT
);
"#;

/// Localized response messages
const TRANSLATIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS response_message_translations (
    code_message TEXT NOT NULL,
    category TEXT NOT NULL,
    language_code TEXT NOT NULL,
    message TEXT NOT NULL,
    PRIMARY KEY (code_message, category, language_code)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_nodes_path ON hierarchy_nodes(hierarchy_path);
CREATE INDEX IF NOT EXISTS idx_nodes_parent ON hierarchy_nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_node_types_type ON parameter_node_types(node_type_id);
CREATE INDEX IF NOT EXISTS idx_properties_parameter ON parameter_properties(parameter_id);
CREATE INDEX IF NOT EXISTS idx_bindings_parameter ON hierarchy_parameters(parameter_id, property_id);
CREATE INDEX IF NOT EXISTS idx_values_binding ON hierarchy_parameter_values(hierarchy_parameter_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_binding_tuple_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let insert = "INSERT INTO hierarchy_parameters
            (hierarchy_id, parameter_id, property_id, created_at) VALUES (1, 2, 3, 'now')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
