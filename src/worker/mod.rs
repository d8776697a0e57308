//! Worker module - bounded execution of parameter operations
//!
//! Every public operation is submitted as one job; the job runs one
//! transaction on a blocking thread while the caller awaits a handle.

pub mod deadline;
pub mod pool;

pub use pool::{PoolConfig, TaskHandle, WorkerPool};
