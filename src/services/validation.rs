//! Input validation and active-node gating shared by the services

use rusqlite::Connection;
use tracing::warn;

use crate::db::models::{HierarchyNode, Propagation, Status};
use crate::db::{bindings, hierarchy};
use crate::error::ParamError;

/// Node ids must be positive
pub fn validate_node_id(hierarchy_id: i64) -> Result<(), ParamError> {
    if hierarchy_id <= 0 {
        return Err(ParamError::InvalidNodeId(hierarchy_id));
    }
    Ok(())
}

/// Unwrap a required id
pub fn require_id(name: &str, id: Option<i64>) -> Result<i64, ParamError> {
    id.ok_or_else(|| ParamError::InvalidArgument(format!("{} is required", name)))
}

pub fn validate_page(page: i64, size: i64) -> Result<(), ParamError> {
    if page < 0 {
        return Err(ParamError::InvalidPagination(format!("page must be >= 0, got {}", page)));
    }
    if size <= 0 {
        return Err(ParamError::InvalidPagination(format!("size must be > 0, got {}", size)));
    }
    Ok(())
}

/// Fail with `NodeDisabled` unless the node exists and is ACTIVE
pub fn validate_node_active(conn: &Connection, hierarchy_id: i64) -> Result<HierarchyNode, ParamError> {
    match hierarchy::get_node(conn, hierarchy_id)? {
        Some(node) if node.status == Status::Active => Ok(node),
        Some(_) => {
            warn!(hierarchy_id, "Rejected mutation on disabled node");
            Err(ParamError::NodeDisabled(hierarchy_id))
        }
        None => {
            warn!(hierarchy_id, "Rejected mutation on unknown node");
            Err(ParamError::NodeDisabled(hierarchy_id))
        }
    }
}

/// Status-only gate for callers that do not need the node itself
pub fn ensure_node_active(conn: &Connection, hierarchy_id: i64) -> Result<(), ParamError> {
    match hierarchy::get_status(conn, hierarchy_id)? {
        Some(Status::Active) => Ok(()),
        status => {
            warn!(hierarchy_id, status = ?status, "Rejected mutation on inactive or unknown node");
            Err(ParamError::NodeDisabled(hierarchy_id))
        }
    }
}

/// Mark a node's bindings as pending distribution
pub fn mark_dirty(conn: &Connection, hierarchy_id: i64, parameter_id: Option<i64>) -> Result<usize, ParamError> {
    ensure_node_active(conn, hierarchy_id)?;
    bindings::mark_propagation(conn, hierarchy_id, parameter_id, Propagation::Propagate)
}
