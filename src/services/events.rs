//! Event system for parameter mutations
//!
//! Events are emitted only after the enclosing transaction committed.
//! Useful for:
//! - Audit logging
//! - Cache invalidation in the request layer

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::db::models::Status;

/// Events emitted by services
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterEvent {
    // Value events
    ValueCreated {
        value_id: i64,
        binding_id: i64,
        hierarchy_id: i64,
        parameter_id: i64,
    },
    ValueStatusUpdated {
        value_id: i64,
        hierarchy_id: i64,
        status: Status,
    },
    ValueDeleted {
        value_id: i64,
        hierarchy_id: i64,
    },

    // Binding events
    BindingStatusChanged {
        hierarchy_id: i64,
        parameter_id: i64,
        property_id: i64,
        status: Status,
        created: bool,
    },

    // Propagation events
    Spread {
        hierarchy_id: i64,
        parameter_id: Option<i64>,
        affected: i64,
    },
    Taken {
        hierarchy_id: i64,
        parent_id: i64,
        bindings: usize,
        values: usize,
    },
}

/// Event bus for broadcasting parameter events
pub struct EventBus {
    sender: broadcast::Sender<ParameterEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: ParameterEvent) {
        trace!(event = ?event, "Emitting parameter event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ParameterEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit line for one event. Propagation is logged at info, the rest at debug.
fn log_event(event: &ParameterEvent) {
    match event {
        ParameterEvent::ValueCreated { value_id, binding_id, hierarchy_id, parameter_id } => {
            debug!(value_id, binding_id, hierarchy_id, parameter_id, "Value created");
        }
        ParameterEvent::ValueStatusUpdated { value_id, hierarchy_id, status } => {
            debug!(value_id, hierarchy_id, status = ?status, "Value status updated");
        }
        ParameterEvent::ValueDeleted { value_id, hierarchy_id } => {
            debug!(value_id, hierarchy_id, "Value deleted");
        }
        ParameterEvent::BindingStatusChanged { hierarchy_id, parameter_id, property_id, status, created } => {
            debug!(hierarchy_id, parameter_id, property_id, status = ?status, created, "Binding status changed");
        }
        ParameterEvent::Spread { hierarchy_id, parameter_id, affected } => {
            info!(hierarchy_id, parameter_id = ?parameter_id, affected, "Parameters spread");
        }
        ParameterEvent::Taken { hierarchy_id, parent_id, bindings, values } => {
            info!(hierarchy_id, parent_id, bindings, values, "Parameters taken from parent");
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
