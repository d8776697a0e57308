//! Hierarchy Params - parameter propagation over an organizational tree
//!
//! Nodes of a merchant/branch/terminal hierarchy bind parameter
//! definitions, hold values under those bindings, and synchronize them
//! with the rest of the tree:
//!
//! - **spread** pushes a node's pending bindings down to every applicable
//!   descendant, overwriting their copies
//! - **take** replaces a node's bindings with its immediate parent's
//!
//! ## Layout
//!
//! ```text
//! ParameterEngine      access check + worker pool, one job per operation
//!     ↓
//! services/            gating, transactions, events
//!     ↓
//! db/                  SQLite repositories over a materialized path index
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/hierarchy-params/
//! ├── parameters.db          # SQLite (WAL) database
//! └── config.toml            # Configuration
//! ```

pub mod access;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod services;
pub mod translate;
pub mod worker;

// Re-exports
pub use access::{AccessGate, Activity, AllowAll, Principal, StaticAccessGate};
pub use config::Config;
pub use db::ParamDb;
pub use engine::ParameterEngine;
pub use error::{ErrorBody, ErrorKind, ParamError};
pub use services::{ParameterEvent, Services};
pub use translate::TranslationCache;
pub use worker::{PoolConfig, WorkerPool};
