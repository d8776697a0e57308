//! Binding store
//!
//! Per-node parameter bindings (`hierarchy_parameters`) and the value rows
//! under them (`hierarchy_parameter_values`). Functions here perform single
//! statements; gating and transactions belong to the services.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::models::{
    current_timestamp, BindingValue, ParameterBinding, Propagation, Status, ValuePayload, ValueRow,
};
use crate::error::ParamError;

/// Value rows are never deletable from the listing view
const NOT_DELETABLE: i64 = 2;

impl ParameterBinding {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("hierarchy_parameter_id")?,
            hierarchy_id: row.get("hierarchy_id")?,
            parameter_id: row.get("parameter_id")?,
            property_id: row.get("property_id")?,
            status: row.get("status")?,
            propagate_to_children: Propagation::from_code(row.get("propagate_to_children")?),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl BindingValue {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("hierarchy_property_id")?,
            binding_id: row.get("hierarchy_parameter_id")?,
            attributes: row.get("hierarchy_attributes")?,
            property_code: row.get("property_code")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Binding that owns a value, resolved from the value id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueOwner {
    pub binding_id: i64,
    pub hierarchy_id: i64,
    pub parameter_id: i64,
    pub property_id: i64,
}

// ============================================================================
// Bindings
// ============================================================================

const BINDING_COLUMNS: &str = "hierarchy_parameter_id, hierarchy_id, parameter_id, property_id, \
     status, propagate_to_children, created_at, updated_at";

/// Binding for exactly (node, parameter, property)
pub fn find_binding(
    conn: &Connection,
    hierarchy_id: i64,
    parameter_id: i64,
    property_id: i64,
) -> Result<Option<ParameterBinding>, ParamError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_parameters \
         WHERE hierarchy_id = ? AND parameter_id = ? AND property_id = ?",
        BINDING_COLUMNS
    );
    let binding = conn
        .query_row(&sql, params![hierarchy_id, parameter_id, property_id], ParameterBinding::from_row)
        .optional()?;
    Ok(binding)
}

/// All bindings of a node
pub fn list_bindings(conn: &Connection, hierarchy_id: i64) -> Result<Vec<ParameterBinding>, ParamError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_parameters WHERE hierarchy_id = ? \
         ORDER BY parameter_id, property_id",
        BINDING_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let bindings = stmt
        .query_map(params![hierarchy_id], ParameterBinding::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(bindings)
}

/// Insert a binding and return its id
pub fn insert_binding(
    conn: &Connection,
    hierarchy_id: i64,
    parameter_id: i64,
    property_id: i64,
    status: Status,
    propagate: Propagation,
) -> Result<i64, ParamError> {
    conn.execute(
        r#"
        INSERT INTO hierarchy_parameters
            (hierarchy_id, parameter_id, property_id, status, propagate_to_children, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            hierarchy_id,
            parameter_id,
            property_id,
            status.code(),
            propagate.code(),
            current_timestamp()
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(binding_id = id, hierarchy_id, parameter_id, property_id, "Inserted binding");
    Ok(id)
}

pub fn update_binding_status(conn: &Connection, binding_id: i64, status: Status) -> Result<usize, ParamError> {
    let changes = conn.execute(
        "UPDATE hierarchy_parameters SET status = ?, updated_at = ? WHERE hierarchy_parameter_id = ?",
        params![status.code(), current_timestamp(), binding_id],
    )?;
    Ok(changes)
}

/// Set the propagation flag on a node's bindings, optionally for one parameter
pub fn mark_propagation(
    conn: &Connection,
    hierarchy_id: i64,
    parameter_id: Option<i64>,
    flag: Propagation,
) -> Result<usize, ParamError> {
    let changes = conn.execute(
        r#"
        UPDATE hierarchy_parameters
        SET propagate_to_children = ?1, updated_at = ?2
        WHERE hierarchy_id = ?3 AND (?4 IS NULL OR parameter_id = ?4)
        "#,
        params![flag.code(), current_timestamp(), hierarchy_id, parameter_id],
    )?;
    debug!(hierarchy_id, parameter_id = ?parameter_id, flag = ?flag, changes, "Marked propagation");
    Ok(changes)
}

// ============================================================================
// Values
// ============================================================================

const VALUE_COLUMNS: &str = "hierarchy_property_id, hierarchy_parameter_id, hierarchy_attributes, \
     property_code, status, created_at, updated_at";

/// Insert a value under a binding; returns (rows inserted, new id)
pub fn insert_value(
    conn: &Connection,
    binding_id: i64,
    attributes: &str,
    property_code: Option<&str>,
    status: Status,
) -> Result<(usize, i64), ParamError> {
    let changes = conn.execute(
        r#"
        INSERT INTO hierarchy_parameter_values
            (hierarchy_parameter_id, hierarchy_attributes, property_code, status, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![binding_id, attributes, property_code, status.code(), current_timestamp()],
    )?;
    Ok((changes, conn.last_insert_rowid()))
}

pub fn get_value(conn: &Connection, value_id: i64) -> Result<Option<BindingValue>, ParamError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_parameter_values WHERE hierarchy_property_id = ?",
        VALUE_COLUMNS
    );
    let value = conn.query_row(&sql, params![value_id], BindingValue::from_row).optional()?;
    Ok(value)
}

pub fn list_binding_values(conn: &Connection, binding_id: i64) -> Result<Vec<BindingValue>, ParamError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_parameter_values WHERE hierarchy_parameter_id = ? \
         ORDER BY hierarchy_property_id",
        VALUE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let values = stmt
        .query_map(params![binding_id], BindingValue::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(values)
}

/// Resolve the binding (and so the node) a value belongs to
pub fn find_value_owner(conn: &Connection, value_id: i64) -> Result<Option<ValueOwner>, ParamError> {
    let owner = conn
        .query_row(
            r#"
            SELECT b.hierarchy_parameter_id, b.hierarchy_id, b.parameter_id, b.property_id
            FROM hierarchy_parameter_values v
            JOIN hierarchy_parameters b ON b.hierarchy_parameter_id = v.hierarchy_parameter_id
            WHERE v.hierarchy_property_id = ?
            "#,
            params![value_id],
            |row| {
                Ok(ValueOwner {
                    binding_id: row.get(0)?,
                    hierarchy_id: row.get(1)?,
                    parameter_id: row.get(2)?,
                    property_id: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(owner)
}

pub fn update_value_status(conn: &Connection, value_id: i64, status: Status) -> Result<usize, ParamError> {
    let changes = conn.execute(
        "UPDATE hierarchy_parameter_values SET status = ?, updated_at = ? WHERE hierarchy_property_id = ?",
        params![status.code(), current_timestamp(), value_id],
    )?;
    Ok(changes)
}

pub fn delete_value(conn: &Connection, value_id: i64) -> Result<usize, ParamError> {
    let changes = conn.execute(
        "DELETE FROM hierarchy_parameter_values WHERE hierarchy_property_id = ?",
        params![value_id],
    )?;
    Ok(changes)
}

/// Number of values under (node, parameter, property)
pub fn count_values(
    conn: &Connection,
    hierarchy_id: i64,
    parameter_id: i64,
    property_id: i64,
) -> Result<i64, ParamError> {
    let count = conn.query_row(
        r#"
        SELECT COUNT(*)
        FROM hierarchy_parameter_values v
        JOIN hierarchy_parameters b ON b.hierarchy_parameter_id = v.hierarchy_parameter_id
        WHERE b.hierarchy_id = ? AND b.parameter_id = ? AND b.property_id = ?
        "#,
        params![hierarchy_id, parameter_id, property_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// One page of values under (node, parameter, property), ordered by value id
pub fn page_values(
    conn: &Connection,
    hierarchy_id: i64,
    parameter_id: i64,
    property_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<ValueRow>, ParamError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT v.hierarchy_property_id, v.hierarchy_attributes, v.status,
               b.hierarchy_parameter_id, b.propagate_to_children
        FROM hierarchy_parameter_values v
        JOIN hierarchy_parameters b ON b.hierarchy_parameter_id = v.hierarchy_parameter_id
        WHERE b.hierarchy_id = ? AND b.parameter_id = ? AND b.property_id = ?
        ORDER BY v.hierarchy_property_id
        LIMIT ? OFFSET ?
        "#,
    )?;

    let raw = stmt
        .query_map(
            params![hierarchy_id, parameter_id, property_id, limit, offset],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(id, attributes, status, binding_id, propagate)| {
            Ok(ValueRow {
                id,
                hierarchy_id,
                parameter_id,
                property_id,
                binding_id,
                status,
                spread: Propagation::from_code(propagate),
                delete: NOT_DELETABLE,
                payload: ValuePayload::decode(&attributes)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn payload(amount: &str) -> String {
        ValuePayload { amount: Some(amount.into()), ..Default::default() }
            .encode()
            .unwrap()
    }

    #[test]
    fn test_binding_lookup_is_node_scoped() {
        let conn = setup();
        insert_binding(&conn, 100, 7, 1, Status::Active, Propagation::Propagate).unwrap();

        assert!(find_binding(&conn, 100, 7, 1).unwrap().is_some());
        assert!(find_binding(&conn, 101, 7, 1).unwrap().is_none());
        assert!(insert_binding(&conn, 100, 7, 1, Status::Active, Propagation::Propagate).is_err());
    }

    #[test]
    fn test_corrupt_status_surfaces() {
        let conn = setup();
        let binding = insert_binding(&conn, 100, 7, 1, Status::Active, Propagation::Propagate).unwrap();
        conn.execute("UPDATE hierarchy_parameters SET status = 0", []).unwrap();

        assert!(matches!(find_binding(&conn, 100, 7, 1), Err(ParamError::Database(_))));
        let (_, value_id) = insert_value(&conn, binding, &payload("1"), None, Status::Active).unwrap();
        conn.execute("UPDATE hierarchy_parameter_values SET status = 3", []).unwrap();
        assert!(get_value(&conn, value_id).is_err());
    }

    #[test]
    fn test_mark_propagation_filter() {
        let conn = setup();
        insert_binding(&conn, 100, 7, 1, Status::Active, Propagation::NoPropagate).unwrap();
        insert_binding(&conn, 100, 8, 2, Status::Active, Propagation::NoPropagate).unwrap();

        assert_eq!(mark_propagation(&conn, 100, Some(7), Propagation::Propagate).unwrap(), 1);
        let flags: Vec<Propagation> = list_bindings(&conn, 100)
            .unwrap()
            .iter()
            .map(|b| b.propagate_to_children)
            .collect();
        assert_eq!(flags, vec![Propagation::Propagate, Propagation::NoPropagate]);

        assert_eq!(mark_propagation(&conn, 100, None, Propagation::Propagate).unwrap(), 2);
    }

    #[test]
    fn test_value_owner_and_delete() {
        let conn = setup();
        let binding = insert_binding(&conn, 100, 7, 1, Status::Active, Propagation::Propagate).unwrap();
        let (changes, value_id) = insert_value(&conn, binding, &payload("5"), Some("PR1"), Status::Active).unwrap();
        assert_eq!(changes, 1);

        let owner = find_value_owner(&conn, value_id).unwrap().unwrap();
        assert_eq!(owner.hierarchy_id, 100);
        assert_eq!(owner.binding_id, binding);

        assert_eq!(update_value_status(&conn, value_id, Status::Inactive).unwrap(), 1);
        assert_eq!(get_value(&conn, value_id).unwrap().unwrap().status, Status::Inactive);

        assert_eq!(delete_value(&conn, value_id).unwrap(), 1);
        assert_eq!(delete_value(&conn, value_id).unwrap(), 0);
        // binding survives its last value
        assert!(find_binding(&conn, 100, 7, 1).unwrap().is_some());
    }

    #[test]
    fn test_paging() {
        let conn = setup();
        let binding = insert_binding(&conn, 100, 7, 1, Status::Active, Propagation::Propagate).unwrap();
        for i in 0..25 {
            insert_value(&conn, binding, &payload(&i.to_string()), None, Status::Active).unwrap();
        }

        assert_eq!(count_values(&conn, 100, 7, 1).unwrap(), 25);
        let page = page_values(&conn, 100, 7, 1, 10, 20).unwrap();
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].payload.amount.as_deref(), Some("20"));
        assert_eq!(page[0].spread, Propagation::Propagate);
        assert_eq!(page[0].delete, 2);
    }

    #[test]
    fn test_corrupt_payload_is_serialization_failure() {
        let conn = setup();
        let binding = insert_binding(&conn, 100, 7, 1, Status::Active, Propagation::Propagate).unwrap();
        insert_value(&conn, binding, "not json", None, Status::Active).unwrap();

        let err = page_values(&conn, 100, 7, 1, 10, 0).unwrap_err();
        assert!(matches!(err, ParamError::SerializationFailed(_)));
    }
}
