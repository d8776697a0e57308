//! Hierarchy path index
//!
//! Read-only view of the organizational tree. Descendant lookup is a prefix
//! match on the materialized `hierarchy_path`, never a graph walk.
//! `upsert_node` exists for operators and fixtures; the tree itself is
//! owned by the hierarchy service.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::models::{HierarchyNode, Status};
use crate::error::ParamError;

const NODE_COLUMNS: &str = "hierarchy_id, parent_id, hierarchy_path, node_type_id, hierarchy_status";

impl HierarchyNode {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("hierarchy_id")?,
            parent_id: row.get("parent_id")?,
            path: row.get("hierarchy_path")?,
            node_type_id: row.get("node_type_id")?,
            status: row.get("hierarchy_status")?,
        })
    }
}

/// Input for registering a node
#[derive(Debug, Clone)]
pub struct NodeInput {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub node_type_id: i64,
    pub status: Status,
}

/// Get node by ID
pub fn get_node(conn: &Connection, id: i64) -> Result<Option<HierarchyNode>, ParamError> {
    let sql = format!("SELECT {} FROM hierarchy_nodes WHERE hierarchy_id = ?", NODE_COLUMNS);
    let node = conn
        .query_row(&sql, params![id], HierarchyNode::from_row)
        .optional()?;
    Ok(node)
}

/// Node status reader; `None` when the node does not exist
pub fn get_status(conn: &Connection, id: i64) -> Result<Option<Status>, ParamError> {
    let status: Option<Status> = conn
        .query_row(
            "SELECT hierarchy_status FROM hierarchy_nodes WHERE hierarchy_id = ?",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    debug!(hierarchy_id = id, status = ?status, "Read hierarchy status");
    Ok(status)
}

/// Immediate parent of a node
pub fn get_parent(conn: &Connection, id: i64) -> Result<Option<HierarchyNode>, ParamError> {
    let sql = format!(
        "SELECT {} FROM hierarchy_nodes WHERE hierarchy_id = \
         (SELECT parent_id FROM hierarchy_nodes WHERE hierarchy_id = ?)",
        NODE_COLUMNS
    );
    let parent = conn
        .query_row(&sql, params![id], HierarchyNode::from_row)
        .optional()?;
    Ok(parent)
}

/// All nodes strictly below `id`, ordered by path
pub fn list_descendants(conn: &Connection, id: i64) -> Result<Vec<HierarchyNode>, ParamError> {
    let sql = format!(
        "SELECT child.{cols} FROM hierarchy_nodes anc \
         JOIN hierarchy_nodes child ON child.hierarchy_path LIKE anc.hierarchy_path || '.%' \
         WHERE anc.hierarchy_id = ? \
         ORDER BY child.hierarchy_path",
        cols = NODE_COLUMNS.replace(", ", ", child."),
    );
    let mut stmt = conn.prepare(&sql)?;
    let nodes = stmt
        .query_map(params![id], HierarchyNode::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(nodes)
}

/// Insert or replace a node, deriving its path from the parent
pub fn upsert_node(conn: &Connection, input: &NodeInput) -> Result<HierarchyNode, ParamError> {
    let path = match input.parent_id {
        Some(parent_id) => {
            let parent = get_node(conn, parent_id)?.ok_or_else(|| {
                ParamError::InvalidArgument(format!("parent node {} does not exist", parent_id))
            })?;
            parent.child_path(input.id)
        }
        None => input.id.to_string(),
    };

    conn.execute(
        r#"
        INSERT INTO hierarchy_nodes (hierarchy_id, parent_id, hierarchy_path, node_type_id, hierarchy_status)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(hierarchy_id) DO UPDATE SET
            parent_id = excluded.parent_id,
            hierarchy_path = excluded.hierarchy_path,
            node_type_id = excluded.node_type_id,
            hierarchy_status = excluded.hierarchy_status
        "#,
        params![input.id, input.parent_id, path, input.node_type_id, input.status.code()],
    )?;

    get_node(conn, input.id)?
        .ok_or_else(|| ParamError::Internal("Node not found after insert".to_string()))
}

/// Enable or disable a node
pub fn set_status(conn: &Connection, id: i64, status: Status) -> Result<bool, ParamError> {
    let changes = conn.execute(
        "UPDATE hierarchy_nodes SET hierarchy_status = ? WHERE hierarchy_id = ?",
        params![status.code(), id],
    )?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        for (id, parent) in [(1, None), (15, Some(1)), (150, Some(15)), (2, None), (151, Some(15))] {
            upsert_node(
                &conn,
                &NodeInput { id, parent_id: parent, node_type_id: 3, status: Status::Active },
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn test_paths_are_materialized() {
        let conn = setup();
        let node = get_node(&conn, 150).unwrap().unwrap();
        assert_eq!(node.path, "1.15.150");
        assert_eq!(node.parent_id, Some(15));
    }

    #[test]
    fn test_descendants_exclude_self_and_siblings() {
        let conn = setup();
        let ids: Vec<i64> = list_descendants(&conn, 1).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![15, 150, 151]);

        let ids: Vec<i64> = list_descendants(&conn, 15).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![150, 151]);

        assert!(list_descendants(&conn, 2).unwrap().is_empty());
    }

    #[test]
    fn test_parent_and_status() {
        let conn = setup();
        assert_eq!(get_parent(&conn, 150).unwrap().unwrap().id, 15);
        assert!(get_parent(&conn, 1).unwrap().is_none());

        assert_eq!(get_status(&conn, 15).unwrap(), Some(Status::Active));
        assert!(set_status(&conn, 15, Status::Inactive).unwrap());
        assert_eq!(get_status(&conn, 15).unwrap(), Some(Status::Inactive));
        assert_eq!(get_status(&conn, 999).unwrap(), None);
    }

    #[test]
    fn test_unknown_status_code_is_an_error() {
        let conn = setup();
        conn.execute("UPDATE hierarchy_nodes SET hierarchy_status = 9 WHERE hierarchy_id = 15", [])
            .unwrap();

        assert!(matches!(get_status(&conn, 15), Err(ParamError::Database(_))));
        assert!(matches!(get_node(&conn, 15), Err(ParamError::Database(_))));
        assert_eq!(get_status(&conn, 1).unwrap(), Some(Status::Active));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let conn = setup();
        let err = upsert_node(
            &conn,
            &NodeInput { id: 7, parent_id: Some(404), node_type_id: 1, status: Status::Active },
        )
        .unwrap_err();
        assert!(matches!(err, ParamError::InvalidArgument(_)));
    }
}
