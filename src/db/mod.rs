//! SQLite database module for hierarchy parameters
//!
//! ## Architecture
//!
//! - Hierarchy nodes and parameter/property definitions are maintained by
//!   other services; this crate only reads them (fixture upserts aside)
//! - Bindings and their values are owned here and mutated only inside
//!   one transaction per top-level operation
//! - File databases run in WAL mode with a dedicated read connection;
//!   writers read back their own data on the write connection
//!
//! ## Tables
//!
//! - `hierarchy_nodes` - Tree with materialized `hierarchy_path`
//! - `parameter_categories`, `system_parameters`, `parameter_node_types`,
//!   `parameter_properties` - Definition catalog
//! - `hierarchy_parameters` - Bindings (one per node/parameter/property)
//! - `hierarchy_parameter_values` - Values under a binding
//! - `response_message_translations` - Localized messages

pub mod schema;
pub mod models;
pub mod hierarchy;
pub mod definitions;
pub mod bindings;
pub mod propagation;
pub mod translations;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Transaction};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ParamError;
use crate::worker::deadline;

/// SQLite database for hierarchy parameters
pub struct ParamDb {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
}

impl ParamDb {
    /// Open or create the database described by `config`
    pub fn from_config(config: &Config) -> Result<Self, ParamError> {
        Self::open(
            &config.db_path(),
            config.read_split,
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    /// Open or create a file database
    pub fn open(db_path: &Path, read_split: bool, busy_timeout: Duration) -> Result<Self, ParamError> {
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| ParamError::Internal(format!("Failed to open SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| ParamError::Internal(format!("Failed to set PRAGMA: {}", e)))?;
        conn.busy_timeout(busy_timeout)?;

        schema::init_schema(&conn)?;

        let reader = if read_split {
            let reader = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| ParamError::Internal(format!("Failed to open read connection: {}", e)))?;
            reader.busy_timeout(busy_timeout)?;
            debug!("Read connection opened");
            Some(Mutex::new(reader))
        } else {
            None
        };

        Ok(Self {
            writer: Mutex::new(conn),
            reader,
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, ParamError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| ParamError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| ParamError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(Self {
            writer: Mutex::new(conn),
            reader: None,
        })
    }

    /// Whether reads are served by a separate connection
    pub fn has_read_split(&self) -> bool {
        self.reader.is_some()
    }

    /// Run a read-only query on the read connection (writer if not split)
    pub fn with_read_conn<F, T>(&self, f: F) -> Result<T, ParamError>
    where
        F: FnOnce(&Connection) -> Result<T, ParamError>,
    {
        match &self.reader {
            Some(reader) => {
                let conn = reader.lock()
                    .map_err(|e| ParamError::Internal(format!("Lock poisoned: {}", e)))?;
                f(&conn)
            }
            None => self.with_conn(f),
        }
    }

    /// Get a reference to the write connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ParamError>
    where
        F: FnOnce(&Connection) -> Result<T, ParamError>,
    {
        let conn = self.writer.lock()
            .map_err(|e| ParamError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, ParamError>
    where
        F: FnOnce(&mut Connection) -> Result<T, ParamError>,
    {
        let mut conn = self.writer.lock()
            .map_err(|e| ParamError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Run `f` inside one write transaction
    ///
    /// Any error rolls the whole transaction back. If the caller's deadline
    /// passed while `f` ran, the transaction is rolled back as well and
    /// `Timeout` is returned, so a timed-out operation never lands.
    pub fn write_tx<F, T>(&self, f: F) -> Result<T, ParamError>
    where
        F: FnOnce(&Transaction) -> Result<T, ParamError>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| ParamError::Internal(format!("Transaction failed: {}", e)))?;

            let value = f(&tx)?;

            if deadline::expired() {
                warn!("Deadline passed before commit, rolling back");
                tx.rollback()
                    .map_err(|e| ParamError::Internal(format!("Rollback failed: {}", e)))?;
                return Err(ParamError::Timeout("operation exceeded its deadline".into()));
            }

            tx.commit()
                .map_err(|e| ParamError::Internal(format!("Commit failed: {}", e)))?;
            Ok(value)
        })
    }
}

// Re-exports
pub use models::{
    BindingValue, CatalogView, CreateValueInput, CreatedValue, HierarchyNode, PagedValues,
    ParameterBinding, ParameterDefinition, Propagation, PropertyDefinition, PropertyTemplate,
    Status, ValuePayload, ValueQuery, ValueRow,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_tx_rolls_back_on_error() {
        let db = ParamDb::open_in_memory().unwrap();

        let result: Result<(), ParamError> = db.write_tx(|tx| {
            tx.execute(
                "INSERT INTO parameter_categories (category_id, category_name) VALUES (1, 'Fees')",
                [],
            )?;
            Err(ParamError::CreateFailed("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_read_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM parameter_categories", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_file_db_reader_sees_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = ParamDb::open(&dir.path().join("p.db"), true, Duration::from_millis(100)).unwrap();
        assert!(db.has_read_split());

        db.write_tx(|tx| {
            tx.execute(
                "INSERT INTO parameter_categories (category_id, category_name) VALUES (1, 'Fees')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let name: String = db
            .with_read_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT category_name FROM parameter_categories WHERE category_id = 1",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(name, "Fees");
    }

    #[test]
    fn test_reader_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let db = ParamDb::open(&dir.path().join("p.db"), true, Duration::from_millis(100)).unwrap();

        let result = db.with_read_conn(|conn| {
            conn.execute("DELETE FROM parameter_categories", [])?;
            Ok(())
        });
        assert!(result.is_err());
    }
}
