//! Bulk statements behind spread and take
//!
//! Each function is one set-based statement over the materialized path
//! index. Ordering, counting and failure classification live in
//! `services::propagation_service`; everything here must run inside the
//! caller's transaction.

use rusqlite::{params, Connection};
use tracing::debug;

use super::models::{current_timestamp, HierarchyNode, Propagation, Status};
use crate::error::ParamError;

/// Bindings of `?1` pending distribution, restricted to active definitions
/// and to the optional parameter filter `?2`
fn spread_source() -> String {
    format!(
        r#"
        src AS (
            SELECT b.hierarchy_parameter_id AS binding_id, b.parameter_id, b.property_id, b.status
            FROM hierarchy_parameters b
            JOIN system_parameters sp ON sp.parameter_id = b.parameter_id
            WHERE b.hierarchy_id = ?1
              AND b.propagate_to_children = {propagate}
              AND sp.status = {active}
              AND (?2 IS NULL OR b.parameter_id = ?2)
        )
        "#,
        propagate = Propagation::PROPAGATE,
        active = Status::ACTIVE,
    )
}

/// Descendants of the path pattern `?3`
const DESCENDANTS: &str = r#"
        kids AS (
            SELECT hierarchy_id, node_type_id
            FROM hierarchy_nodes
            WHERE hierarchy_path LIKE ?3
        )
"#;

fn descendant_pattern(node: &HierarchyNode) -> String {
    format!("{}{}%", node.path, HierarchyNode::SEPARATOR)
}

// ============================================================================
// Spread
// ============================================================================

/// Remove descendants' bindings (and values) for the pairs about to be spread
///
/// Only descendants whose node type the parameter applies to are touched.
pub fn delete_child_bindings(
    conn: &Connection,
    node: &HierarchyNode,
    parameter_id: Option<i64>,
) -> Result<(usize, usize), ParamError> {
    let doomed = format!(
        r#"
        WITH {src}, {kids},
        doomed AS (
            SELECT cb.hierarchy_parameter_id
            FROM hierarchy_parameters cb
            JOIN kids ON kids.hierarchy_id = cb.hierarchy_id
            JOIN parameter_node_types nt
                ON nt.parameter_id = cb.parameter_id AND nt.node_type_id = kids.node_type_id
            WHERE EXISTS (
                SELECT 1 FROM src
                WHERE src.parameter_id = cb.parameter_id AND src.property_id = cb.property_id
            )
        )
        "#,
        src = spread_source(),
        kids = DESCENDANTS,
    );
    let pattern = descendant_pattern(node);

    let values = conn.execute(
        &format!(
            "{} DELETE FROM hierarchy_parameter_values \
             WHERE hierarchy_parameter_id IN (SELECT hierarchy_parameter_id FROM doomed)",
            doomed
        ),
        params![node.id, parameter_id, pattern],
    )?;
    let bindings = conn.execute(
        &format!(
            "{} DELETE FROM hierarchy_parameters \
             WHERE hierarchy_parameter_id IN (SELECT hierarchy_parameter_id FROM doomed)",
            doomed
        ),
        params![node.id, parameter_id, pattern],
    )?;

    debug!(hierarchy_id = node.id, bindings, values, "Cleared descendant bindings");
    Ok((bindings, values))
}

/// Number of (descendant, binding) pairs spread would create
pub fn count_to_spread(
    conn: &Connection,
    node: &HierarchyNode,
    parameter_id: Option<i64>,
) -> Result<i64, ParamError> {
    let sql = format!(
        r#"
        WITH {src}, {kids}
        SELECT COUNT(*)
        FROM src
        JOIN parameter_node_types nt ON nt.parameter_id = src.parameter_id
        JOIN kids ON kids.node_type_id = nt.node_type_id
        "#,
        src = spread_source(),
        kids = DESCENDANTS,
    );
    let count = conn.query_row(
        &sql,
        params![node.id, parameter_id, descendant_pattern(node)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Copy the node's pending bindings onto every applicable descendant
///
/// Copies keep the source status and are marked `NO_PROPAGATE`.
pub fn insert_child_bindings(
    conn: &Connection,
    node: &HierarchyNode,
    parameter_id: Option<i64>,
) -> Result<usize, ParamError> {
    let sql = format!(
        r#"
        WITH {src}, {kids}
        INSERT INTO hierarchy_parameters
            (hierarchy_id, parameter_id, property_id, status, propagate_to_children, created_at)
        SELECT kids.hierarchy_id, src.parameter_id, src.property_id, src.status, {no_propagate}, ?4
        FROM src
        JOIN parameter_node_types nt ON nt.parameter_id = src.parameter_id
        JOIN kids ON kids.node_type_id = nt.node_type_id
        "#,
        src = spread_source(),
        kids = DESCENDANTS,
        no_propagate = Propagation::NO_PROPAGATE,
    );
    let inserted = conn.execute(
        &sql,
        params![node.id, parameter_id, descendant_pattern(node), current_timestamp()],
    )?;
    Ok(inserted)
}

/// Copy the node's values under the descendants' fresh bindings
///
/// Restricted to applicable node types like the binding copy, so a binding
/// an inapplicable descendant holds for the same pair is left alone.
pub fn insert_child_values(
    conn: &Connection,
    node: &HierarchyNode,
    parameter_id: Option<i64>,
) -> Result<usize, ParamError> {
    let sql = format!(
        r#"
        WITH {src}, {kids}
        INSERT INTO hierarchy_parameter_values
            (hierarchy_parameter_id, hierarchy_attributes, property_code, status, created_at)
        SELECT cb.hierarchy_parameter_id, v.hierarchy_attributes, v.property_code, v.status, ?4
        FROM src
        JOIN hierarchy_parameter_values v ON v.hierarchy_parameter_id = src.binding_id
        JOIN hierarchy_parameters cb
            ON cb.parameter_id = src.parameter_id AND cb.property_id = src.property_id
        JOIN kids ON kids.hierarchy_id = cb.hierarchy_id
        JOIN parameter_node_types nt
            ON nt.parameter_id = src.parameter_id AND nt.node_type_id = kids.node_type_id
        WHERE v.hierarchy_attributes IS NOT NULL AND v.status IS NOT NULL
        ORDER BY cb.hierarchy_parameter_id, v.hierarchy_property_id
        "#,
        src = spread_source(),
        kids = DESCENDANTS,
    );
    let inserted = conn.execute(
        &sql,
        params![node.id, parameter_id, descendant_pattern(node), current_timestamp()],
    )?;
    Ok(inserted)
}

// ============================================================================
// Take
// ============================================================================

/// Wipe every binding and value of a node
pub fn delete_own_bindings(conn: &Connection, hierarchy_id: i64) -> Result<(usize, usize), ParamError> {
    let values = conn.execute(
        r#"
        DELETE FROM hierarchy_parameter_values
        WHERE hierarchy_parameter_id IN (
            SELECT hierarchy_parameter_id FROM hierarchy_parameters WHERE hierarchy_id = ?
        )
        "#,
        params![hierarchy_id],
    )?;
    let bindings = conn.execute(
        "DELETE FROM hierarchy_parameters WHERE hierarchy_id = ?",
        params![hierarchy_id],
    )?;
    debug!(hierarchy_id, bindings, values, "Wiped own bindings");
    Ok((bindings, values))
}

/// Copy the parent's active bindings applicable to the node's type
///
/// Copies are forced to `ACTIVE` and `NO_PROPAGATE`.
pub fn insert_bindings_from_parent(
    conn: &Connection,
    node: &HierarchyNode,
    parent_id: i64,
) -> Result<usize, ParamError> {
    let inserted = conn.execute(
        r#"
        INSERT INTO hierarchy_parameters
            (hierarchy_id, parameter_id, property_id, status, propagate_to_children, created_at)
        SELECT ?1, pb.parameter_id, pb.property_id, ?4, ?5, ?6
        FROM hierarchy_parameters pb
        JOIN system_parameters sp ON sp.parameter_id = pb.parameter_id
        JOIN parameter_node_types nt
            ON nt.parameter_id = pb.parameter_id AND nt.node_type_id = ?3
        WHERE pb.hierarchy_id = ?2
          AND pb.status = ?4
          AND sp.status = ?4
        "#,
        params![
            node.id,
            parent_id,
            node.node_type_id,
            Status::ACTIVE,
            Propagation::NO_PROPAGATE,
            current_timestamp()
        ],
    )?;
    Ok(inserted)
}

/// Copy the parent's values under the node's fresh bindings
pub fn insert_values_from_parent(
    conn: &Connection,
    node: &HierarchyNode,
    parent_id: i64,
) -> Result<usize, ParamError> {
    let inserted = conn.execute(
        r#"
        INSERT INTO hierarchy_parameter_values
            (hierarchy_parameter_id, hierarchy_attributes, property_code, status, created_at)
        SELECT nb.hierarchy_parameter_id, v.hierarchy_attributes, v.property_code, v.status, ?3
        FROM hierarchy_parameters nb
        JOIN hierarchy_parameters pb
            ON pb.hierarchy_id = ?2
           AND pb.parameter_id = nb.parameter_id
           AND pb.property_id = nb.property_id
        JOIN hierarchy_parameter_values v ON v.hierarchy_parameter_id = pb.hierarchy_parameter_id
        WHERE nb.hierarchy_id = ?1
        ORDER BY nb.hierarchy_parameter_id, v.hierarchy_property_id
        "#,
        params![node.id, parent_id, current_timestamp()],
    )?;
    Ok(inserted)
}
