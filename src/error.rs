//! Error types for hierarchy-params
//!
//! Every domain failure carries a stable code (the code the translation
//! table is keyed by) and a human-readable message. Infrastructure failures
//! collapse into the generic `_500` code.

use serde::Serialize;
use thiserror::Error;

/// Prefix shared by every error code emitted by this service
pub const CODE_PREFIX: &str = "nxt-msa-hierarchy-parameter";

#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Invalid hierarchy id {0}: must be greater than zero")]
    InvalidNodeId(i64),

    #[error("Hierarchy node {0} is disabled")]
    NodeDisabled(i64),

    #[error("Create failed: {0}")]
    CreateFailed(String),

    #[error("Update failed: {0}")]
    UpdateFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Spread failed: {0}")]
    SpreadParameterFailed(String),

    #[error("Spread of parameter-property failed: {0}")]
    SpreadPropertyFailed(String),

    #[error("Take failed: {0}")]
    TakeParameterFailed(String),

    #[error("Take of parameter-property failed: {0}")]
    TakePropertyFailed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Worker pool closed")]
    PoolClosed,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`ParamError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NodeDisabled,
    CreateFailed,
    UpdateFailed,
    DeleteFailed,
    Serialization,
    Propagation,
    AccessDenied,
    Internal,
}

impl ParamError {
    /// Stable code used by clients and the translation table
    pub fn code(&self) -> String {
        let suffix = match self {
            Self::InvalidArgument(_) => "400_60",
            Self::InvalidPagination(_) => "400_61",
            Self::UpdateFailed(_) => "400_62",
            Self::SpreadParameterFailed(_) => "400_63",
            Self::SpreadPropertyFailed(_) => "400_64",
            Self::TakeParameterFailed(_) => "400_65",
            Self::TakePropertyFailed(_) => "400_66",
            Self::DeleteFailed(_) => "400_67",
            Self::InvalidNodeId(_) => "400_68",
            Self::NodeDisabled(_) => "400_78",
            Self::SerializationFailed(_) => "401_70",
            Self::CreateFailed(_) => "401_71",
            Self::AccessDenied(_) => "401",
            Self::Timeout(_)
            | Self::PoolClosed
            | Self::Database(_)
            | Self::Io(_)
            | Self::Config(_)
            | Self::Internal(_) => "500",
        };
        format!("{}_{}", CODE_PREFIX, suffix)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::InvalidPagination(_) | Self::InvalidNodeId(_) => {
                ErrorKind::InvalidArgument
            }
            Self::NodeDisabled(_) => ErrorKind::NodeDisabled,
            Self::CreateFailed(_) => ErrorKind::CreateFailed,
            Self::UpdateFailed(_) => ErrorKind::UpdateFailed,
            Self::DeleteFailed(_) => ErrorKind::DeleteFailed,
            Self::SerializationFailed(_) => ErrorKind::Serialization,
            Self::SpreadParameterFailed(_)
            | Self::SpreadPropertyFailed(_)
            | Self::TakeParameterFailed(_)
            | Self::TakePropertyFailed(_) => ErrorKind::Propagation,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            _ => ErrorKind::Internal,
        }
    }

    /// True for errors raised by the domain rules rather than infrastructure
    pub fn is_domain(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// Serializable body handed to the request layer
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for ParamError {
    fn from(e: serde_json::Error) -> Self {
        ParamError::SerializationFailed(e.to_string())
    }
}

/// Error body returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, ParamError>;
