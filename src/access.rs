//! Access gate consulted before any operation reaches the services
//!
//! The real role/policy store lives outside this crate; it plugs in by
//! implementing [`AccessGate`].

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// Module name every parameter activity is registered under
pub const MODULE: &str = "parameters";

/// Activities of the parameters module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// Catalog, template and value listing
    Request,
    CreateProp,
    DisableProp,
    DeleteProp,
    /// Enable/disable a binding
    Disable,
    /// Spread and take
    Propagate,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Activity::Request => "request",
            Activity::CreateProp => "create_prop",
            Activity::DisableProp => "disable_prop",
            Activity::DeleteProp => "delete_prop",
            Activity::Disable => "disable",
            Activity::Propagate => "propagate",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity as received from the request layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role_id: role_id.into(),
        }
    }
}

/// Access-check predicate
#[async_trait::async_trait]
pub trait AccessGate: Send + Sync {
    async fn has_access(
        &self,
        user: &str,
        role: &str,
        module: &str,
        activity: Activity,
    ) -> Result<bool, ParamError>;
}

/// Grants everything (CLI, tests)
pub struct AllowAll;

#[async_trait::async_trait]
impl AccessGate for AllowAll {
    async fn has_access(&self, _: &str, _: &str, _: &str, _: Activity) -> Result<bool, ParamError> {
        Ok(true)
    }
}

/// In-memory grant table
#[derive(Debug, Default)]
pub struct StaticAccessGate {
    grants: HashSet<(String, String, String, Activity)>,
}

impl StaticAccessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `principal` to perform `activity` in the parameters module
    pub fn grant(mut self, principal: &Principal, activity: Activity) -> Self {
        self.grants.insert((
            principal.user_id.clone(),
            principal.role_id.clone(),
            MODULE.to_string(),
            activity,
        ));
        self
    }
}

#[async_trait::async_trait]
impl AccessGate for StaticAccessGate {
    async fn has_access(
        &self,
        user: &str,
        role: &str,
        module: &str,
        activity: Activity,
    ) -> Result<bool, ParamError> {
        let key = (user.to_string(), role.to_string(), module.to_string(), activity);
        Ok(self.grants.contains(&key))
    }
}
