//! Propagation service - spread and take
//!
//! Spread pushes a node's pending bindings down to every applicable
//! descendant; take pulls the immediate parent's active bindings into a
//! node. Both overwrite (delete then reinsert) inside one transaction, so
//! surrogate ids change on every run.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::db::models::Propagation;
use crate::db::{bindings, hierarchy, propagation, ParamDb};
use crate::error::ParamError;

use super::events::{EventBus, ParameterEvent};
use super::validation::{validate_node_active, validate_node_id};

/// Counts reported by a successful take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeOutcome {
    pub parent_id: i64,
    pub bindings: usize,
    pub values: usize,
}

/// Propagation service
pub struct PropagationService {
    db: Arc<ParamDb>,
    events: Arc<EventBus>,
}

impl PropagationService {
    pub fn new(db: Arc<ParamDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Push pending bindings to descendants; returns the number of
    /// (descendant, binding) pairs written
    pub fn spread(&self, hierarchy_id: i64, parameter_id: Option<i64>) -> Result<i64, ParamError> {
        validate_node_id(hierarchy_id)?;
        info!(hierarchy_id, parameter_id = ?parameter_id, "Spreading parameters");

        let affected = self
            .db
            .write_tx(|tx| {
                let node = validate_node_active(tx, hierarchy_id)?;

                let (bindings_deleted, values_deleted) =
                    propagation::delete_child_bindings(tx, &node, parameter_id)?;
                debug!(bindings_deleted, values_deleted, "Descendant copies removed");

                let count = propagation::count_to_spread(tx, &node, parameter_id)?;
                if count == 0 {
                    debug!(hierarchy_id, "Nothing to spread");
                    return Ok(0);
                }

                let inserted = propagation::insert_child_bindings(tx, &node, parameter_id)?;
                if inserted == 0 {
                    return Err(ParamError::SpreadPropertyFailed(format!(
                        "{} candidate bindings but none inserted below node {}",
                        count, hierarchy_id
                    )));
                }

                let values = propagation::insert_child_values(tx, &node, parameter_id)?;
                if values == 0 {
                    warn!(hierarchy_id, inserted, "Bindings spread without any values");
                }

                // node must still be active when its flags are reset
                validate_node_active(tx, hierarchy_id)?;
                bindings::mark_propagation(tx, hierarchy_id, parameter_id, Propagation::NoPropagate)?;

                debug!(hierarchy_id, inserted, values, "Spread written");
                Ok(count)
            })
            .map_err(|e| {
                if e.is_domain() || matches!(e, ParamError::Timeout(_)) {
                    e
                } else {
                    error!(hierarchy_id, "Spread failed: {}", e);
                    ParamError::SpreadParameterFailed(e.to_string())
                }
            })?;

        info!(hierarchy_id, affected, "Spread complete");
        if affected > 0 {
            self.events.emit(ParameterEvent::Spread { hierarchy_id, parameter_id, affected });
        }
        Ok(affected)
    }

    /// Replace all of a node's bindings with copies of its parent's
    ///
    /// The whole node is resynchronized; `parameter_id` is only recorded.
    pub fn take(&self, hierarchy_id: i64, parameter_id: Option<i64>) -> Result<TakeOutcome, ParamError> {
        validate_node_id(hierarchy_id)?;
        info!(hierarchy_id, parameter_id = ?parameter_id, "Taking parameters from parent");

        let outcome = self.db.write_tx(|tx| {
            let node = validate_node_active(tx, hierarchy_id)?;

            let (bindings_deleted, values_deleted) = propagation::delete_own_bindings(tx, hierarchy_id)?;
            debug!(bindings_deleted, values_deleted, "Own bindings wiped");

            let parent = hierarchy::get_parent(tx, hierarchy_id)?.ok_or_else(|| {
                ParamError::TakePropertyFailed(format!("node {} has no parent", hierarchy_id))
            })?;

            let inserted = propagation::insert_bindings_from_parent(tx, &node, parent.id)?;
            if inserted == 0 {
                return Err(ParamError::TakePropertyFailed(format!(
                    "parent {} has no active bindings for node type {}",
                    parent.id, node.node_type_id
                )));
            }

            let values = propagation::insert_values_from_parent(tx, &node, parent.id)?;
            if values == 0 {
                return Err(ParamError::TakeParameterFailed(format!(
                    "parent {} has no values to copy",
                    parent.id
                )));
            }

            Ok(TakeOutcome { parent_id: parent.id, bindings: inserted, values })
        })?;

        info!(
            hierarchy_id,
            parent_id = outcome.parent_id,
            bindings = outcome.bindings,
            values = outcome.values,
            "Take complete"
        );
        self.events.emit(ParameterEvent::Taken {
            hierarchy_id,
            parent_id: outcome.parent_id,
            bindings: outcome.bindings,
            values: outcome.values,
        });
        Ok(outcome)
    }
}
