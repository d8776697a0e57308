//! Binding service - value and binding mutations
//!
//! Every operation is one write transaction: gate the owning node, apply
//! the change, mark the node dirty. Events go out after commit.

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::models::{
    BindingValue, CatalogView, CreateValueInput, CreatedValue, HierarchyNode, Propagation,
    PropertyDefinition, Status,
};
use crate::db::{bindings, definitions, ParamDb};
use crate::error::ParamError;

use super::catalog_service::load_catalog;
use super::events::{EventBus, ParameterEvent};
use super::validation::{ensure_node_active, mark_dirty, validate_node_active, validate_node_id};

/// Binding service for mutations
pub struct BindingService {
    db: Arc<ParamDb>,
    events: Arc<EventBus>,
}

impl BindingService {
    pub fn new(db: Arc<ParamDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Create a value, creating the node's binding for the pair if needed
    pub fn create_value(&self, input: CreateValueInput) -> Result<CreatedValue, ParamError> {
        validate_node_id(input.hierarchy_id)?;
        let attributes = input.payload.encode()?;

        let created = self.db.write_tx(|tx| {
            let node = validate_node_active(tx, input.hierarchy_id)?;
            let property = resolve_property(tx, &node, input.parameter_id, input.property_id)?;

            let binding_id = match bindings::find_binding(tx, input.hierarchy_id, input.parameter_id, input.property_id)? {
                Some(binding) => binding.id,
                None => bindings::insert_binding(
                    tx,
                    input.hierarchy_id,
                    input.parameter_id,
                    input.property_id,
                    Status::Active,
                    Propagation::Propagate,
                )?,
            };

            let property_code = input.property_code.clone().or(property.property_code);
            let (inserted, value_id) =
                bindings::insert_value(tx, binding_id, &attributes, property_code.as_deref(), input.status)?;
            if inserted == 0 {
                return Err(ParamError::CreateFailed(format!(
                    "no value inserted under binding {}",
                    binding_id
                )));
            }

            mark_dirty(tx, input.hierarchy_id, Some(input.parameter_id))?;

            Ok(CreatedValue {
                id: value_id,
                binding_id,
                hierarchy_id: input.hierarchy_id,
                parameter_id: input.parameter_id,
                property_id: input.property_id,
                status: input.status,
                payload: input.payload.clone(),
            })
        })?;

        info!(
            value_id = created.id,
            hierarchy_id = created.hierarchy_id,
            parameter_id = created.parameter_id,
            "Value created"
        );
        self.events.emit(ParameterEvent::ValueCreated {
            value_id: created.id,
            binding_id: created.binding_id,
            hierarchy_id: created.hierarchy_id,
            parameter_id: created.parameter_id,
        });
        Ok(created)
    }

    /// Change the status of one value
    pub fn update_value_status(&self, value_id: i64, status: Status) -> Result<BindingValue, ParamError> {
        let (hierarchy_id, value) = self.db.write_tx(|tx| {
            let owner = bindings::find_value_owner(tx, value_id)?
                .ok_or_else(|| ParamError::UpdateFailed(format!("value {} not found", value_id)))?;
            ensure_node_active(tx, owner.hierarchy_id)?;

            let changes = bindings::update_value_status(tx, value_id, status)?;
            if changes != 1 {
                return Err(ParamError::UpdateFailed(format!(
                    "expected 1 row for value {}, updated {}",
                    value_id, changes
                )));
            }

            mark_dirty(tx, owner.hierarchy_id, Some(owner.parameter_id))?;

            let value = bindings::get_value(tx, value_id)?
                .ok_or_else(|| ParamError::Internal("Value not found after update".to_string()))?;
            Ok((owner.hierarchy_id, value))
        })?;

        info!(value_id, hierarchy_id, status = ?status, "Value status updated");
        self.events.emit(ParameterEvent::ValueStatusUpdated { value_id, hierarchy_id, status });
        Ok(value)
    }

    /// Delete one value; its binding stays even when it was the last one
    pub fn delete_value(&self, value_id: i64) -> Result<(), ParamError> {
        let hierarchy_id = self.db.write_tx(|tx| {
            let owner = bindings::find_value_owner(tx, value_id)?
                .ok_or_else(|| ParamError::DeleteFailed(format!("value {} not found", value_id)))?;
            ensure_node_active(tx, owner.hierarchy_id)?;

            if bindings::delete_value(tx, value_id)? == 0 {
                return Err(ParamError::DeleteFailed(format!("value {} not deleted", value_id)));
            }

            mark_dirty(tx, owner.hierarchy_id, Some(owner.parameter_id))?;
            Ok(owner.hierarchy_id)
        })?;

        info!(value_id, hierarchy_id, "Value deleted");
        self.events.emit(ParameterEvent::ValueDeleted { value_id, hierarchy_id });
        Ok(())
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Enable or disable a (parameter, property) pair on a node
    ///
    /// Creates the binding when missing. Returns the node's refreshed catalog.
    pub fn set_binding_status(
        &self,
        hierarchy_id: i64,
        parameter_id: i64,
        property_id: i64,
        status: Status,
    ) -> Result<CatalogView, ParamError> {
        validate_node_id(hierarchy_id)?;

        let (created, view) = self.db.write_tx(|tx| {
            let node = validate_node_active(tx, hierarchy_id)?;

            let created = match bindings::find_binding(tx, hierarchy_id, parameter_id, property_id)? {
                Some(binding) => {
                    let changes = bindings::update_binding_status(tx, binding.id, status)?;
                    if changes != 1 {
                        return Err(ParamError::UpdateFailed(format!(
                            "binding {} not updated",
                            binding.id
                        )));
                    }
                    false
                }
                None => {
                    resolve_property(tx, &node, parameter_id, property_id)?;
                    bindings::insert_binding(
                        tx,
                        hierarchy_id,
                        parameter_id,
                        property_id,
                        status,
                        Propagation::Propagate,
                    )?;
                    true
                }
            };

            mark_dirty(tx, hierarchy_id, Some(parameter_id))?;
            Ok((created, load_catalog(tx, hierarchy_id)?))
        })?;

        info!(hierarchy_id, parameter_id, property_id, status = ?status, created, "Binding status set");
        self.events.emit(ParameterEvent::BindingStatusChanged {
            hierarchy_id,
            parameter_id,
            property_id,
            status,
            created,
        });
        Ok(view)
    }
}

/// Property definition for the pair, or `InvalidArgument`
///
/// The parameter must apply to the node's type, otherwise the binding would
/// sit outside the node's catalog and outside every spread.
fn resolve_property(
    conn: &Connection,
    node: &HierarchyNode,
    parameter_id: i64,
    property_id: i64,
) -> Result<PropertyDefinition, ParamError> {
    let Some(parameter) = definitions::get_parameter(conn, parameter_id)? else {
        return Err(ParamError::InvalidArgument(format!("unknown parameter {}", parameter_id)));
    };
    if !parameter.applicable_node_types.contains(&node.node_type_id) {
        warn!(hierarchy_id = node.id, node_type_id = node.node_type_id, parameter_id, "Parameter not applicable");
        return Err(ParamError::InvalidArgument(format!(
            "parameter {} does not apply to node type {}",
            parameter_id, node.node_type_id
        )));
    }
    match definitions::get_property(conn, property_id)? {
        Some(property) if property.parameter_id == parameter_id => Ok(property),
        Some(property) => {
            warn!(property_id, owner = property.parameter_id, parameter_id, "Property belongs to another parameter");
            Err(ParamError::InvalidArgument(format!(
                "property {} does not belong to parameter {}",
                property_id, parameter_id
            )))
        }
        None => Err(ParamError::InvalidArgument(format!("unknown property {}", property_id))),
    }
}
