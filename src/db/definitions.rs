//! Definition catalog
//!
//! Static parameter, property and category definitions plus the node types
//! each parameter applies to. Reads never fail on absence; an unknown id
//! simply yields an empty set.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::models::{
    AttributeSchema, CatalogItem, Category, HierarchyNode, ParameterDefinition, Propagation,
    PropertyDefinition, Status,
};
use crate::error::ParamError;

// ============================================================================
// Row mapping
// ============================================================================

/// Parameter row before its node types are attached
struct ParameterRow {
    id: i64,
    name: String,
    description: Option<String>,
    category_id: i64,
    max_properties: i64,
    status: Status,
}

impl ParameterRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("parameter_id")?,
            name: row.get("parameter_name")?,
            description: row.get("parameter_description")?,
            category_id: row.get("category_id")?,
            max_properties: row.get("max_properties")?,
            status: row.get("status")?,
        })
    }

    fn into_definition(self, conn: &Connection) -> Result<ParameterDefinition, ParamError> {
        let applicable_node_types = get_node_types(conn, self.id)?;
        Ok(ParameterDefinition {
            id: self.id,
            name: self.name,
            description: self.description,
            category_id: self.category_id,
            applicable_node_types,
            max_properties: self.max_properties,
            status: self.status,
        })
    }
}

fn property_from_row(row: &Row) -> Result<(i64, i64, Option<String>, String), rusqlite::Error> {
    Ok((
        row.get("property_id")?,
        row.get("parameter_id")?,
        row.get("property_code")?,
        row.get("property_attributes")?,
    ))
}

fn into_property(
    (id, parameter_id, property_code, attributes): (i64, i64, Option<String>, String),
) -> Result<PropertyDefinition, ParamError> {
    let attributes: Vec<AttributeSchema> = serde_json::from_str(&attributes).map_err(|e| {
        ParamError::SerializationFailed(format!("attributes of property {}: {}", id, e))
    })?;
    Ok(PropertyDefinition { id, parameter_id, property_code, attributes })
}

const PARAMETER_COLUMNS: &str = "p.parameter_id, p.parameter_name, p.parameter_description, \
     p.category_id, p.max_properties, p.status";

// ============================================================================
// Reads
// ============================================================================

/// Node types a parameter applies to
pub fn get_node_types(conn: &Connection, parameter_id: i64) -> Result<Vec<i64>, ParamError> {
    let mut stmt = conn.prepare(
        "SELECT node_type_id FROM parameter_node_types WHERE parameter_id = ? ORDER BY node_type_id",
    )?;
    let types = stmt
        .query_map(params![parameter_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(types)
}

/// Get a parameter definition by ID
pub fn get_parameter(conn: &Connection, id: i64) -> Result<Option<ParameterDefinition>, ParamError> {
    let sql = format!("SELECT {} FROM system_parameters p WHERE p.parameter_id = ?", PARAMETER_COLUMNS);
    let row = conn.query_row(&sql, params![id], ParameterRow::from_row).optional()?;
    row.map(|r| r.into_definition(conn)).transpose()
}

/// Parameter definitions applicable to a node type
pub fn list_applicable_parameters(
    conn: &Connection,
    node_type_id: i64,
) -> Result<Vec<ParameterDefinition>, ParamError> {
    let sql = format!(
        "SELECT {} FROM system_parameters p \
         JOIN parameter_node_types nt ON nt.parameter_id = p.parameter_id \
         WHERE nt.node_type_id = ? \
         ORDER BY p.parameter_id",
        PARAMETER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![node_type_id], ParameterRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(|r| r.into_definition(conn)).collect()
}

/// Property definitions owned by a parameter
pub fn list_properties(conn: &Connection, parameter_id: i64) -> Result<Vec<PropertyDefinition>, ParamError> {
    let mut stmt = conn.prepare(
        "SELECT property_id, parameter_id, property_code, property_attributes \
         FROM parameter_properties WHERE parameter_id = ? ORDER BY property_id",
    )?;
    let rows = stmt
        .query_map(params![parameter_id], property_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(into_property).collect()
}

/// Get a property definition by ID
pub fn get_property(conn: &Connection, id: i64) -> Result<Option<PropertyDefinition>, ParamError> {
    let row = conn
        .query_row(
            "SELECT property_id, parameter_id, property_code, property_attributes \
             FROM parameter_properties WHERE property_id = ?",
            params![id],
            property_from_row,
        )
        .optional()?;
    row.map(into_property).transpose()
}

/// Properties of `parameter_id`, provided the parameter applies to `node_type_id`
pub fn list_template_properties(
    conn: &Connection,
    node_type_id: i64,
    parameter_id: i64,
) -> Result<Vec<PropertyDefinition>, ParamError> {
    let mut stmt = conn.prepare(
        "SELECT pr.property_id, pr.parameter_id, pr.property_code, pr.property_attributes \
         FROM parameter_properties pr \
         JOIN parameter_node_types nt ON nt.parameter_id = pr.parameter_id \
         WHERE pr.parameter_id = ?1 AND nt.node_type_id = ?2 \
         ORDER BY pr.property_id",
    )?;
    let rows = stmt
        .query_map(params![parameter_id, node_type_id], property_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(into_property).collect()
}

/// Catalog lines for a node, each tagged with its category name and description
///
/// Ordered by category name, parameter name and property id. Unbound pairs
/// report `NO_STATUS` and `NO_PROPAGATE`.
pub fn catalog_rows(
    conn: &Connection,
    node: &HierarchyNode,
) -> Result<Vec<(String, Option<String>, CatalogItem)>, ParamError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT c.category_name, c.category_description,
               p.parameter_id, p.parameter_name, p.parameter_description, p.max_properties,
               pr.property_id,
               COALESCE(b.hierarchy_parameter_id, 0) AS binding_id,
               COALESCE(b.status, ?3) AS binding_status,
               COALESCE(b.propagate_to_children, ?4) AS propagate
        FROM system_parameters p
        JOIN parameter_node_types nt
            ON nt.parameter_id = p.parameter_id AND nt.node_type_id = ?2
        JOIN parameter_categories c ON c.category_id = p.category_id
        JOIN parameter_properties pr ON pr.parameter_id = p.parameter_id
        LEFT JOIN hierarchy_parameters b
            ON b.hierarchy_id = ?1
           AND b.parameter_id = p.parameter_id
           AND b.property_id = pr.property_id
        WHERE p.status = ?5
        ORDER BY c.category_name, p.parameter_name, pr.property_id
        "#,
    )?;

    let rows = stmt
        .query_map(
            params![
                node.id,
                node.node_type_id,
                Status::NO_STATUS,
                Propagation::NO_PROPAGATE,
                Status::ACTIVE
            ],
            |row| {
                let item = CatalogItem {
                    parameter_id: row.get("parameter_id")?,
                    binding_id: row.get("binding_id")?,
                    property_id: row.get("property_id")?,
                    hierarchy_id: node.id,
                    name: row.get("parameter_name")?,
                    description: row.get("parameter_description")?,
                    status: row.get("binding_status")?,
                    max_elements: row.get("max_properties")?,
                    spread: Propagation::from_code(row.get("propagate")?),
                };
                Ok((row.get("category_name")?, row.get("category_description")?, item))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(hierarchy_id = node.id, rows = rows.len(), "Loaded catalog rows");
    Ok(rows)
}

// ============================================================================
// Fixture / admin writes
// ============================================================================

/// Input for registering a parameter definition
#[derive(Debug, Clone)]
pub struct ParameterInput {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub applicable_node_types: Vec<i64>,
    pub max_properties: i64,
    pub status: Status,
}

pub fn upsert_category(conn: &Connection, category: &Category) -> Result<(), ParamError> {
    conn.execute(
        r#"
        INSERT INTO parameter_categories (category_id, category_name, category_description)
        VALUES (?, ?, ?)
        ON CONFLICT(category_id) DO UPDATE SET
            category_name = excluded.category_name,
            category_description = excluded.category_description
        "#,
        params![category.id, category.name, category.description],
    )?;
    Ok(())
}

/// Insert or replace a parameter definition and its applicable node types
pub fn upsert_parameter(conn: &Connection, input: &ParameterInput) -> Result<ParameterDefinition, ParamError> {
    conn.execute(
        r#"
        INSERT INTO system_parameters
            (parameter_id, parameter_name, parameter_description, category_id, max_properties, status)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(parameter_id) DO UPDATE SET
            parameter_name = excluded.parameter_name,
            parameter_description = excluded.parameter_description,
            category_id = excluded.category_id,
            max_properties = excluded.max_properties,
            status = excluded.status
        "#,
        params![
            input.id,
            input.name,
            input.description,
            input.category_id,
            input.max_properties,
            input.status.code()
        ],
    )?;

    conn.execute("DELETE FROM parameter_node_types WHERE parameter_id = ?", params![input.id])?;
    for node_type_id in &input.applicable_node_types {
        conn.execute(
            "INSERT OR IGNORE INTO parameter_node_types (parameter_id, node_type_id) VALUES (?, ?)",
            params![input.id, node_type_id],
        )?;
    }

    get_parameter(conn, input.id)?
        .ok_or_else(|| ParamError::Internal("Parameter not found after insert".to_string()))
}

pub fn upsert_property(conn: &Connection, property: &PropertyDefinition) -> Result<(), ParamError> {
    let attributes = serde_json::to_string(&property.attributes)?;
    conn.execute(
        r#"
        INSERT INTO parameter_properties (property_id, parameter_id, property_code, property_attributes)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(property_id) DO UPDATE SET
            parameter_id = excluded.parameter_id,
            property_code = excluded.property_code,
            property_attributes = excluded.property_attributes
        "#,
        params![property.id, property.parameter_id, property.property_code, attributes],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::hierarchy::{self, NodeInput};
    use crate::db::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for (id, name) in [(1, "Limits"), (2, "Fees")] {
            upsert_category(&conn, &Category { id, name: name.into(), description: None }).unwrap();
        }
        for (id, name, category, types, status) in [
            (7, "Daily limit", 1, vec![3], Status::Active),
            (8, "Commission", 2, vec![3, 4], Status::Active),
            (9, "Legacy", 2, vec![3], Status::Inactive),
        ] {
            upsert_parameter(
                &conn,
                &ParameterInput {
                    id,
                    name: name.into(),
                    description: None,
                    category_id: category,
                    applicable_node_types: types,
                    max_properties: 2,
                    status,
                },
            )
            .unwrap();
        }
        for (id, parameter) in [(1, 7), (2, 8), (3, 8), (4, 9)] {
            upsert_property(
                &conn,
                &PropertyDefinition {
                    id,
                    parameter_id: parameter,
                    property_code: Some(format!("PR{}", id)),
                    attributes: vec![AttributeSchema {
                        label: Some("Amount".into()),
                        data_type: Some("decimal".into()),
                        ..Default::default()
                    }],
                },
            )
            .unwrap();
        }
        hierarchy::upsert_node(
            &conn,
            &NodeInput { id: 100, parent_id: None, node_type_id: 3, status: Status::Active },
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_applicable_parameters_by_node_type() {
        let conn = setup();
        let ids: Vec<i64> = list_applicable_parameters(&conn, 4).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![8]);

        let commission = get_parameter(&conn, 8).unwrap().unwrap();
        assert_eq!(commission.applicable_node_types, vec![3, 4]);

        assert!(list_applicable_parameters(&conn, 99).unwrap().is_empty());
    }

    #[test]
    fn test_properties_decode_attributes() {
        let conn = setup();
        let props = list_properties(&conn, 8).unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props[0].attributes[0].label.as_deref(), Some("Amount"));
        assert!(list_properties(&conn, 404).unwrap().is_empty());
    }

    #[test]
    fn test_template_requires_applicable_type() {
        let conn = setup();
        assert_eq!(list_template_properties(&conn, 3, 7).unwrap().len(), 1);
        assert!(list_template_properties(&conn, 4, 7).unwrap().is_empty());
    }

    #[test]
    fn test_catalog_rows_skip_inactive_definitions() {
        let conn = setup();
        let node = hierarchy::get_node(&conn, 100).unwrap().unwrap();
        let rows = catalog_rows(&conn, &node).unwrap();

        let names: Vec<&str> = rows.iter().map(|(c, _, _)| c.as_str()).collect();
        assert_eq!(names, vec!["Fees", "Fees", "Limits"]);
        assert!(rows.iter().all(|(_, _, item)| item.parameter_id != 9));
        assert!(rows.iter().all(|(_, _, item)| item.status == Status::NO_STATUS && item.binding_id == 0));
    }
}
