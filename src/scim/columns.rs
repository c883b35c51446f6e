//! Column mapping for SCIM filter push-down.
//!
//! A [`ColumnMap`] tells the planner which SCIM attributes the store can
//! filter natively, under which column, and how the column compares values.
//! Attributes absent from the map are never pushed down.
//!
//! ## Built-in User Mapping
//!
//! | Attribute     | Column         | Class                |
//! |---------------|----------------|----------------------|
//! | `id`          | `id`           | identifier           |
//! | `userName`    | `user_name`    | case-insensitive text|
//! | `externalId`  | `external_id`  | exact text           |
//! | `displayName` | `display_name` | case-insensitive text|
//! | `active`      | `active`       | boolean              |
//!
//! ## Built-in Group Mapping
//!
//! | Attribute     | Column         | Class                |
//! |---------------|----------------|----------------------|
//! | `id`          | `id`           | identifier           |
//! | `displayName` | `display_name` | case-insensitive text|
//! | `externalId`  | `external_id`  | exact text           |
//!
//! Multi-valued attributes (`emails`, `members`, ...) have no column; filters
//! on them are evaluated in memory.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::evaluate::get_ignore_case;

/// How a column compares values. Decides which operators push down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum ValueClass {
    /// Text compared without regard to case (`userName`, `displayName`).
    CaseInsensitiveText,
    /// Text compared byte-for-byte (`externalId`).
    ExactText,
    /// Boolean flag (`active`).
    Boolean,
    /// Opaque identifier, compared without regard to case.
    Identifier,
}

impl ValueClass {
    /// Whether the column holds text values.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            ValueClass::CaseInsensitiveText | ValueClass::ExactText
        )
    }
}

/// Storage column backing one SCIM attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    /// Storage column identifier
    pub column: String,
    /// Comparison class of the column
    pub class: ValueClass,
}

/// SCIM resource type for attribute mapping context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScimResourceType {
    User,
    Group,
}

/// Per-resource-type table from lowercase attribute name to [`ColumnSpec`].
///
/// Deserializes from a plain table (`userName = { column = "...", class = "..." }`);
/// keys are lowercased on the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, ColumnSpec>", into = "HashMap<String, ColumnSpec>")]
pub struct ColumnMap {
    columns: HashMap<String, ColumnSpec>,
}

impl From<HashMap<String, ColumnSpec>> for ColumnMap {
    fn from(columns: HashMap<String, ColumnSpec>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(attr, spec)| (attr.to_lowercase(), spec))
                .collect(),
        }
    }
}

impl From<ColumnMap> for HashMap<String, ColumnSpec> {
    fn from(map: ColumnMap) -> Self {
        map.columns
    }
}

static USER_COLUMNS: Lazy<ColumnMap> = Lazy::new(|| {
    ColumnMap::new()
        .with("id", "id", ValueClass::Identifier)
        .with("userName", "user_name", ValueClass::CaseInsensitiveText)
        .with("externalId", "external_id", ValueClass::ExactText)
        .with("displayName", "display_name", ValueClass::CaseInsensitiveText)
        .with("active", "active", ValueClass::Boolean)
});

static GROUP_COLUMNS: Lazy<ColumnMap> = Lazy::new(|| {
    ColumnMap::new()
        .with("id", "id", ValueClass::Identifier)
        .with("displayName", "display_name", ValueClass::CaseInsensitiveText)
        .with("externalId", "external_id", ValueClass::ExactText)
});

impl ColumnMap {
    /// Create an empty mapping (nothing pushes down).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the column for `attr`.
    pub fn with(mut self, attr: &str, column: impl Into<String>, class: ValueClass) -> Self {
        self.columns.insert(
            attr.to_lowercase(),
            ColumnSpec {
                column: column.into(),
                class,
            },
        );
        self
    }

    /// Built-in User mapping.
    pub fn user() -> &'static ColumnMap {
        &USER_COLUMNS
    }

    /// Built-in Group mapping.
    pub fn group() -> &'static ColumnMap {
        &GROUP_COLUMNS
    }

    /// Built-in mapping for `resource_type`.
    pub fn for_resource(resource_type: ScimResourceType) -> &'static ColumnMap {
        match resource_type {
            ScimResourceType::User => Self::user(),
            ScimResourceType::Group => Self::group(),
        }
    }

    /// Column for `attr`, matched case-insensitively.
    pub fn get(&self, attr: &str) -> Option<&ColumnSpec> {
        self.columns.get(&attr.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Project a SCIM record onto the mapped columns, producing the row a
    /// store would hold for it. Unset attributes become `null`.
    pub fn project(&self, record: &Value) -> Value {
        let mut row = Map::new();
        for (attr, spec) in &self.columns {
            let value = record
                .as_object()
                .and_then(|fields| get_ignore_case(fields, attr))
                .cloned()
                .unwrap_or(Value::Null);
            row.insert(spec.column.clone(), value);
        }
        Value::Object(row)
    }
}
