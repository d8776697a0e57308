//! Row and view models for the parameter store
//!
//! Status-like columns are small integers in the database; they are exposed
//! here as enums that serialize back to the same integers.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::ParamError;

/// Current UTC timestamp as an RFC 3339 string (second precision)
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Codes
// ============================================================================

/// Status of nodes, definitions, bindings and values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Status {
    Active,
    Inactive,
}

impl Status {
    pub const ACTIVE: i64 = 1;
    pub const INACTIVE: i64 = 2;

    /// Catalog status reported for unbound parameters
    pub const NO_STATUS: i64 = 2;

    pub fn code(self) -> i64 {
        match self {
            Status::Active => Self::ACTIVE,
            Status::Inactive => Self::INACTIVE,
        }
    }

    pub fn is_active(self) -> bool {
        self == Status::Active
    }
}

impl From<Status> for i64 {
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl TryFrom<i64> for Status {
    type Error = ParamError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Self::ACTIVE => Ok(Status::Active),
            Self::INACTIVE => Ok(Status::Inactive),
            other => Err(ParamError::InvalidArgument(format!("unknown status code {}", other))),
        }
    }
}

/// Unknown codes fail the row instead of reading as INACTIVE
impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = i64::column_result(value)?;
        Status::try_from(code).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Whether a binding still has to be pushed to the node's children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Propagation {
    /// Pending distribution (stale for children)
    Propagate,
    /// Already distributed
    NoPropagate,
}

impl Propagation {
    pub const PROPAGATE: i64 = 1;
    pub const NO_PROPAGATE: i64 = 2;

    pub fn code(self) -> i64 {
        match self {
            Propagation::Propagate => Self::PROPAGATE,
            Propagation::NoPropagate => Self::NO_PROPAGATE,
        }
    }

    /// Anything other than PROPAGATE counts as distributed
    pub fn from_code(code: i64) -> Self {
        if code == Self::PROPAGATE {
            Propagation::Propagate
        } else {
            Propagation::NoPropagate
        }
    }

    /// PROPAGATE if any of the flags is PROPAGATE
    pub fn any<I: IntoIterator<Item = Propagation>>(flags: I) -> Self {
        if flags.into_iter().any(|f| f == Propagation::Propagate) {
            Propagation::Propagate
        } else {
            Propagation::NoPropagate
        }
    }
}

impl From<Propagation> for i64 {
    fn from(flag: Propagation) -> Self {
        flag.code()
    }
}

impl TryFrom<i64> for Propagation {
    type Error = ParamError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(Propagation::from_code(value))
    }
}

// ============================================================================
// Hierarchy & definitions (externally owned)
// ============================================================================

/// A node of the organizational tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: i64,
    pub parent_id: Option<i64>,
    /// Dot-separated ancestor ids ending with the node's own id
    pub path: String,
    pub node_type_id: i64,
    pub status: Status,
}

impl HierarchyNode {
    /// Path segment separator
    pub const SEPARATOR: char = '.';

    /// Path a child of this node would carry
    pub fn child_path(&self, child_id: i64) -> String {
        format!("{}{}{}", self.path, Self::SEPARATOR, child_id)
    }

    /// Ancestor ids from the root down to the parent
    pub fn ancestor_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .path
            .split(Self::SEPARATOR)
            .filter_map(|segment| segment.parse().ok())
            .collect();
        ids.pop();
        ids
    }

    pub fn is_descendant_of(&self, other: &HierarchyNode) -> bool {
        self.path
            .strip_prefix(other.path.as_str())
            .is_some_and(|rest| rest.starts_with(Self::SEPARATOR))
    }
}

/// Grouping category of parameter definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// Static parameter definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub category_id: i64,
    pub applicable_node_types: Vec<i64>,
    pub max_properties: i64,
    pub status: Status,
}

/// One element of a property's attribute schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub length: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub field_name: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub place_holder: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
}

/// Static property definition owned by a parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: i64,
    pub parameter_id: i64,
    pub property_code: Option<String>,
    pub attributes: Vec<AttributeSchema>,
}

// ============================================================================
// Bindings & values (owned by this crate)
// ============================================================================

/// A node's declaration that a (parameter, property) pair is configured there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterBinding {
    pub id: i64,
    pub hierarchy_id: i64,
    pub parameter_id: i64,
    pub property_id: i64,
    pub status: Status,
    pub propagate_to_children: Propagation,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Opaque value payload stored as JSON under a binding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePayload {
    #[serde(rename = "LABEL_PARAMETER", default, skip_serializing_if = "Option::is_none")]
    pub label_parameter: Option<String>,
    #[serde(rename = "AMOUNT_MIN", default, skip_serializing_if = "Option::is_none")]
    pub amount_min: Option<String>,
    #[serde(rename = "AMOUNT", default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(rename = "AMOUNT_MAX", default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<String>,
    #[serde(rename = "TYPE", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl ValuePayload {
    pub fn encode(&self) -> Result<String, ParamError> {
        serde_json::to_string(self)
            .map_err(|e| ParamError::SerializationFailed(format!("value payload: {}", e)))
    }

    pub fn decode(json: &str) -> Result<Self, ParamError> {
        serde_json::from_str(json)
            .map_err(|e| ParamError::SerializationFailed(format!("value payload: {}", e)))
    }
}

/// One concrete value row under a binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingValue {
    pub id: i64,
    pub binding_id: i64,
    /// Raw JSON attributes as stored
    pub attributes: String,
    pub property_code: Option<String>,
    pub status: Status,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Input for creating a value (lookup-or-create of the owning binding)
#[derive(Debug, Clone, Deserialize)]
pub struct CreateValueInput {
    pub hierarchy_id: i64,
    pub parameter_id: i64,
    pub property_id: i64,
    #[serde(default = "default_status")]
    pub status: Status,
    #[serde(default)]
    pub property_code: Option<String>,
    #[serde(flatten)]
    pub payload: ValuePayload,
}

fn default_status() -> Status {
    Status::Active
}

/// Value created by `create_value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedValue {
    pub id: i64,
    pub binding_id: i64,
    pub hierarchy_id: i64,
    pub parameter_id: i64,
    pub property_id: i64,
    pub status: Status,
    #[serde(flatten)]
    pub payload: ValuePayload,
}

// ============================================================================
// Views
// ============================================================================

/// One parameter/property line in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogItem {
    pub parameter_id: i64,
    /// Binding id, 0 when the node has no binding
    pub binding_id: i64,
    pub property_id: i64,
    pub hierarchy_id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Binding status or `Status::NO_STATUS`
    pub status: i64,
    pub max_elements: i64,
    pub spread: Propagation,
}

/// Catalog items sharing a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<CatalogItem>,
}

/// Per-node grouped catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogView {
    pub categories: Vec<CategoryGroup>,
    pub spread: Propagation,
}

impl CatalogView {
    /// Group items by category name; first occurrence fixes the order
    pub fn group(rows: Vec<(String, Option<String>, CatalogItem)>) -> Self {
        let mut categories: Vec<CategoryGroup> = Vec::new();
        for (name, description, item) in rows {
            match categories.iter_mut().find(|c| c.name == name) {
                Some(group) => group.parameters.push(item),
                None => categories.push(CategoryGroup {
                    name,
                    description,
                    parameters: vec![item],
                }),
            }
        }
        let spread = Propagation::any(
            categories
                .iter()
                .flat_map(|c| c.parameters.iter().map(|p| p.spread)),
        );
        Self { categories, spread }
    }

    pub fn items(&self) -> impl Iterator<Item = &CatalogItem> {
        self.categories.iter().flat_map(|c| c.parameters.iter())
    }
}

/// Property attribute schema annotated with the node's status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyTemplate {
    pub parameter_id: i64,
    pub property_id: i64,
    pub hierarchy_id: i64,
    pub status: Status,
    pub elements: Vec<AttributeSchema>,
}

/// Value row as listed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueRow {
    pub id: i64,
    pub hierarchy_id: i64,
    pub parameter_id: i64,
    pub property_id: i64,
    pub binding_id: i64,
    pub status: i64,
    pub spread: Propagation,
    pub delete: i64,
    #[serde(flatten)]
    pub payload: ValuePayload,
}

/// Query for a page of values
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValueQuery {
    pub hierarchy_id: Option<i64>,
    pub parameter_id: Option<i64>,
    pub property_id: Option<i64>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    10
}

/// A page of values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagedValues {
    pub data: Vec<ValueRow>,
    pub page: i64,
    pub size: i64,
    pub spread: Propagation,
    pub total_pages: i64,
    pub total_elements: i64,
}

impl PagedValues {
    /// ceil(total / size)
    pub fn page_count(total: i64, size: i64) -> i64 {
        if size <= 0 {
            return 0;
        }
        total / size + i64::from(total % size > 0)
    }
}
