//! Catalog service - read paths
//!
//! Catalog aggregation, template resolution and value listing. All reads go
//! through the read connection.

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::models::{CatalogView, PagedValues, Propagation, PropertyTemplate, ValueQuery};
use crate::db::{bindings, definitions, hierarchy, ParamDb};
use crate::error::ParamError;

use super::validation::{require_id, validate_node_id, validate_page};

/// Grouped catalog of a node, on any connection
///
/// Shared with the binding service, which rebuilds the view inside its own
/// transaction after changing a binding.
pub(crate) fn load_catalog(conn: &Connection, hierarchy_id: i64) -> Result<CatalogView, ParamError> {
    let rows = match hierarchy::get_node(conn, hierarchy_id)? {
        Some(node) => definitions::catalog_rows(conn, &node)?,
        None => Vec::new(),
    };
    Ok(CatalogView::group(rows))
}

/// Catalog service for the read operations
pub struct CatalogService {
    db: Arc<ParamDb>,
}

impl CatalogService {
    pub fn new(db: Arc<ParamDb>) -> Self {
        Self { db }
    }

    /// Per-node grouped catalog with aggregate spread flag
    pub fn get_catalog(&self, hierarchy_id: i64) -> Result<CatalogView, ParamError> {
        validate_node_id(hierarchy_id)?;

        let view = self.db.with_read_conn(|conn| load_catalog(conn, hierarchy_id))?;
        info!(
            hierarchy_id,
            categories = view.categories.len(),
            spread = ?view.spread,
            "Catalog loaded"
        );
        Ok(view)
    }

    /// Property schemas of a parameter, annotated with the node's status
    pub fn get_template(&self, hierarchy_id: i64, parameter_id: i64) -> Result<Vec<PropertyTemplate>, ParamError> {
        validate_node_id(hierarchy_id)?;

        self.db.with_read_conn(|conn| {
            let Some(node) = hierarchy::get_node(conn, hierarchy_id)? else {
                debug!(hierarchy_id, "Template requested for unknown node");
                return Ok(Vec::new());
            };

            let templates = definitions::list_template_properties(conn, node.node_type_id, parameter_id)?
                .into_iter()
                .map(|property| PropertyTemplate {
                    parameter_id: property.parameter_id,
                    property_id: property.id,
                    hierarchy_id,
                    status: node.status,
                    elements: property.attributes,
                })
                .collect();
            Ok(templates)
        })
    }

    /// One page of values under (node, parameter, property)
    pub fn list_values(&self, query: &ValueQuery) -> Result<PagedValues, ParamError> {
        let hierarchy_id = require_id("hierarchy_id", query.hierarchy_id)?;
        let parameter_id = require_id("parameter_id", query.parameter_id)?;
        let property_id = require_id("property_id", query.property_id)?;
        validate_page(query.page, query.size)?;

        let page = query.page.max(1);
        let size = query.size;
        let offset = size.saturating_mul(page - 1);

        let (total, data) = self.db.with_read_conn(|conn| {
            let total = bindings::count_values(conn, hierarchy_id, parameter_id, property_id)?;
            let data = bindings::page_values(conn, hierarchy_id, parameter_id, property_id, size, offset)?;
            Ok((total, data))
        })?;

        let spread = Propagation::any(data.iter().map(|row| row.spread));
        debug!(hierarchy_id, parameter_id, property_id, total, page, "Listed values");

        Ok(PagedValues {
            data,
            page,
            size,
            spread,
            total_pages: PagedValues::page_count(total, size),
            total_elements: total,
        })
    }
}
