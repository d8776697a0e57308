//! Service layer for hierarchy parameters
//!
//! Services encapsulate the domain rules between the engine and the
//! repositories:
//! - Input validation and active-node gating
//! - One transaction per operation
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! ParameterEngine (async, pooled)
//!     ↓
//! Service Layer (domain rules)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod validation;
pub mod catalog_service;
pub mod binding_service;
pub mod propagation_service;

// Re-exports
pub use events::{EventBus, ParameterEvent};
pub use catalog_service::CatalogService;
pub use binding_service::BindingService;
pub use propagation_service::{PropagationService, TakeOutcome};

use crate::db::ParamDb;
use std::sync::Arc;

/// Service container
///
/// Holds all services over one shared database handle.
pub struct Services {
    pub catalog: Arc<CatalogService>,
    pub bindings: Arc<BindingService>,
    pub propagation: Arc<PropagationService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<ParamDb>) -> Self {
        Self::with_events(db, Arc::new(EventBus::new()))
    }

    /// Create all services publishing to an existing bus
    pub fn with_events(db: Arc<ParamDb>, events: Arc<EventBus>) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db.clone())),
            bindings: Arc::new(BindingService::new(db.clone(), events.clone())),
            propagation: Arc::new(PropagationService::new(db, events.clone())),
            events,
        }
    }
}
