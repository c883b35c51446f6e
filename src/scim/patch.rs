//! SCIM 2.0 PATCH Operations
//!
//! Operation types and the structural updates shared by the User and Group
//! engines (RFC 7644 Section 3.5.2).
//!
//! ## Operations
//!
//! - `add`: Add value(s) to an attribute. Multi-valued attributes are
//!   appended to; complex attributes have their sub-attributes merged.
//! - `replace`: Replace attribute value. Complex attributes are merged the
//!   same way; anything else is overwritten.
//! - `remove`: Remove an attribute, sub-attribute, or selected elements.
//!
//! Op names are matched case-insensitively. Assigning `null` clears the
//! target (RFC 7643 Section 2.5).
//!
//! ## Examples
//!
//! ```json
//! [
//!   { "op": "replace", "path": "displayName", "value": "New Name" },
//!   { "op": "add", "path": "emails", "value": [{"type": "home", "value": "home@example.com"}] },
//!   { "op": "remove", "path": "emails[type eq \"work\"]" }
//! ]
//! ```

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::{
    error::ScimErrorType,
    evaluate::evaluate,
    filter::{CompareOp, Filter, FilterValue, LogicalOp},
    path::PatchPath,
};

/// A single SCIM PATCH operation, as supplied by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct PatchOperation {
    /// `add`, `replace` or `remove`, in any case
    pub op: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn new(op: impl Into<String>, path: Option<&str>, value: Option<Value>) -> Self {
        Self {
            op: op.into(),
            path: path.map(str::to_string),
            value,
        }
    }

    /// Create an add operation
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "add".into(),
            path: Some(path.into()),
            value: Some(value),
        }
    }

    /// Create a replace operation
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: "replace".into(),
            path: Some(path.into()),
            value: Some(value),
        }
    }

    /// Create a remove operation
    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: "remove".into(),
            path: Some(path.into()),
            value: None,
        }
    }

    /// Parse the op token.
    pub fn kind(&self) -> Result<PatchOpKind, PatchError> {
        PatchOpKind::parse(&self.op)
    }
}

/// The three PATCH operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchOpKind {
    Add,
    Replace,
    Remove,
}

impl PatchOpKind {
    /// Parse an op token, ignoring ASCII case.
    pub fn parse(op: &str) -> Result<Self, PatchError> {
        match op.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(PatchOpKind::Add),
            "replace" => Ok(PatchOpKind::Replace),
            "remove" => Ok(PatchOpKind::Remove),
            _ => Err(PatchError::InvalidValue(format!(
                "operation '{}' not supported",
                op
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatchOpKind::Add => "add",
            PatchOpKind::Replace => "replace",
            PatchOpKind::Remove => "remove",
        }
    }
}

/// PATCH operation errors.
///
/// Any error aborts the whole batch; the caller's state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// Path cannot be classified or is unsupported for the resource
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Value fails type or shape validation for its target
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Operation needs a target it does not have
    #[error("No target: {0}")]
    NoTarget(String),
}

impl PatchError {
    /// HTTP status for this failure.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    /// SCIM `scimType` for this failure.
    pub fn scim_type(&self) -> ScimErrorType {
        match self {
            PatchError::InvalidPath(_) => ScimErrorType::InvalidPath,
            PatchError::InvalidValue(_) => ScimErrorType::InvalidValue,
            PatchError::NoTarget(_) => ScimErrorType::NoTarget,
        }
    }
}

// =============================================================================
// Payload Updates
// =============================================================================

/// Apply an add or replace to the free-form payload at a structured path.
///
/// Parents of extension and dot-notation targets are created when missing.
pub(crate) fn set_path(
    payload: &mut Map<String, Value>,
    path: &PatchPath,
    kind: PatchOpKind,
    value: Value,
) -> Result<(), PatchError> {
    match path {
        PatchPath::NoPath => merge_object(payload, value, kind),
        PatchPath::Simple { attr } => {
            set_attribute(payload, attr, value, kind);
            Ok(())
        }
        PatchPath::ValuePath {
            attr,
            filter,
            sub_attr,
        } => set_value_path(payload, attr, filter, sub_attr.as_deref(), value, kind),
        PatchPath::Extension { urn, attr } => {
            set_nested(payload, urn, &attr.split('.').collect::<Vec<_>>(), value, kind)
        }
        PatchPath::DotNotation { parent, child } => set_nested(
            payload,
            parent,
            &child.split('.').collect::<Vec<_>>(),
            value,
            kind,
        ),
    }
}

/// Apply a remove to the free-form payload at a structured path.
///
/// Removing something that is not there is a no-op.
pub(crate) fn remove_path(
    payload: &mut Map<String, Value>,
    path: &PatchPath,
) -> Result<(), PatchError> {
    match path {
        PatchPath::NoPath => Err(PatchError::NoTarget(
            "remove operation requires a path".into(),
        )),
        PatchPath::Simple { attr } => {
            remove_ignore_case(payload, attr);
            Ok(())
        }
        PatchPath::ValuePath {
            attr,
            filter,
            sub_attr,
        } => {
            remove_value_path(payload, attr, filter, sub_attr.as_deref());
            Ok(())
        }
        PatchPath::Extension { urn, attr } => {
            remove_nested(payload, urn, &attr.split('.').collect::<Vec<_>>());
            Ok(())
        }
        PatchPath::DotNotation { parent, child } => {
            remove_nested(payload, parent, &child.split('.').collect::<Vec<_>>());
            Ok(())
        }
    }
}

/// Existing key in `map` matching `name` case-insensitively.
pub(crate) fn find_key(map: &Map<String, Value>, name: &str) -> Option<String> {
    if map.contains_key(name) {
        return Some(name.to_string());
    }
    map.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
}

pub(crate) fn remove_ignore_case(map: &mut Map<String, Value>, name: &str) -> Option<Value> {
    let key = find_key(map, name)?;
    map.remove(&key)
}

/// Drop every key in `keys` (case-insensitively).
pub(crate) fn strip_keys(map: &mut Map<String, Value>, keys: &[&str]) {
    map.retain(|k, _| !keys.iter().any(|key| key.eq_ignore_ascii_case(k)));
}

/// Merge an object value into the payload key by key.
fn merge_object(
    payload: &mut Map<String, Value>,
    value: Value,
    kind: PatchOpKind,
) -> Result<(), PatchError> {
    let Value::Object(fields) = value else {
        return Err(PatchError::InvalidValue(
            "operation without a path requires an object value".into(),
        ));
    };
    for (key, value) in fields {
        set_attribute(payload, &key, value, kind);
    }
    Ok(())
}

/// Set `attr` in `map`, stored under `attr`'s spelling.
///
/// - `null` removes the attribute.
/// - Objects merge into an existing object.
/// - `add` appends to an existing array, skipping elements already present.
/// - Anything else overwrites.
pub(crate) fn set_attribute(
    map: &mut Map<String, Value>,
    attr: &str,
    value: Value,
    kind: PatchOpKind,
) {
    let existing = remove_ignore_case(map, attr);

    let merged = match (existing, value) {
        (_, Value::Null) => return,
        (Some(Value::Object(mut current)), Value::Object(incoming)) => {
            for (key, value) in incoming {
                set_attribute(&mut current, &key, value, PatchOpKind::Replace);
            }
            Value::Object(current)
        }
        (Some(Value::Array(mut current)), incoming) if kind == PatchOpKind::Add => {
            let incoming = match incoming {
                Value::Array(items) => items,
                single => vec![single],
            };
            for item in incoming {
                if !current.contains(&item) {
                    current.push(item);
                }
            }
            Value::Array(current)
        }
        (_, value) => value,
    };

    map.insert(attr.to_string(), merged);
}

/// Walk (creating as needed) `root` then `segments[..n-1]`, and set the last
/// segment.
fn set_nested(
    payload: &mut Map<String, Value>,
    root: &str,
    segments: &[&str],
    value: Value,
    kind: PatchOpKind,
) -> Result<(), PatchError> {
    let Some((last, parents)) = segments.split_last() else {
        set_attribute(payload, root, value, kind);
        return Ok(());
    };

    let mut current = object_entry(payload, root)?;
    for segment in parents {
        current = object_entry(current, segment)?;
    }
    set_attribute(current, last, value, kind);
    Ok(())
}

/// Locate-or-create the object under `key`.
fn object_entry<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> Result<&'a mut Map<String, Value>, PatchError> {
    let key = find_key(map, key).unwrap_or_else(|| key.to_string());
    let entry = map
        .entry(key.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if entry.is_null() {
        *entry = Value::Object(Map::new());
    }
    entry
        .as_object_mut()
        .ok_or_else(|| PatchError::InvalidValue(format!("'{}' is not a complex attribute", key)))
}

/// Remove `segments` under `root`, pruning containers left empty.
fn remove_nested(payload: &mut Map<String, Value>, root: &str, segments: &[&str]) {
    let mut path = Vec::with_capacity(segments.len() + 1);
    path.push(root);
    path.extend_from_slice(segments);
    remove_in(payload, &path);
}

fn remove_in(map: &mut Map<String, Value>, path: &[&str]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        remove_ignore_case(map, first);
        return;
    }
    let Some(key) = find_key(map, first) else {
        return;
    };
    let now_empty = match map.get_mut(&key) {
        Some(Value::Object(child)) => {
            remove_in(child, rest);
            child.is_empty()
        }
        _ => false,
    };
    if now_empty {
        map.remove(&key);
    }
}

/// Add or replace on the elements of `attr` selected by `filter`.
///
/// With no matching element a new one is appended, seeded with the
/// selector's equality fields.
fn set_value_path(
    payload: &mut Map<String, Value>,
    attr: &str,
    filter: &Filter,
    sub_attr: Option<&str>,
    value: Value,
    kind: PatchOpKind,
) -> Result<(), PatchError> {
    if sub_attr.is_none() && !value.is_object() {
        return Err(PatchError::InvalidValue(format!(
            "value for '{}[{}]' must be an object",
            attr, filter
        )));
    }

    let key = find_key(payload, attr).unwrap_or_else(|| attr.to_string());
    let entry = payload.entry(key).or_insert(Value::Null);
    if entry.is_null() {
        *entry = Value::Array(Vec::new());
    }
    let Some(elements) = entry.as_array_mut() else {
        return Err(PatchError::InvalidPath(format!(
            "'{}' is not multi-valued and cannot be filtered",
            attr
        )));
    };

    let selector = selector_fields(filter);
    let mut matched = false;
    for element in elements.iter_mut() {
        if evaluate(filter, element) {
            matched = true;
            assign_element(element, &selector, sub_attr, value.clone(), kind)?;
        }
    }

    if !matched {
        let mut element = Value::Object(selector.clone());
        assign_element(&mut element, &selector, sub_attr, value, PatchOpKind::Add)?;
        elements.push(element);
    }

    Ok(())
}

/// Whole-element replace keeps the selector's fields, so the element is
/// still selected afterwards.
fn assign_element(
    element: &mut Value,
    selector: &Map<String, Value>,
    sub_attr: Option<&str>,
    value: Value,
    kind: PatchOpKind,
) -> Result<(), PatchError> {
    let Some(fields) = element.as_object_mut() else {
        return Err(PatchError::InvalidValue(
            "selected element is not a complex value".into(),
        ));
    };
    match (sub_attr, value) {
        (Some(sub), value) => set_attribute(fields, sub, value, kind),
        (None, Value::Object(incoming)) => {
            if kind == PatchOpKind::Replace {
                *fields = selector.clone();
            }
            for (key, value) in incoming {
                set_attribute(fields, &key, value, PatchOpKind::Replace);
            }
        }
        (None, _) => {
            return Err(PatchError::InvalidValue(
                "value for a selected element must be an object".into(),
            ));
        }
    }
    Ok(())
}

/// Remove the elements of `attr` selected by `filter`, or their `sub_attr`.
/// An attribute left with no elements is removed.
fn remove_value_path(
    payload: &mut Map<String, Value>,
    attr: &str,
    filter: &Filter,
    sub_attr: Option<&str>,
) {
    let Some(key) = find_key(payload, attr) else {
        return;
    };
    let now_empty = match payload.get_mut(&key) {
        Some(Value::Array(elements)) => {
            match sub_attr {
                Some(sub) => {
                    for element in elements.iter_mut().filter(|e| evaluate(filter, e)) {
                        if let Some(fields) = element.as_object_mut() {
                            remove_ignore_case(fields, sub);
                        }
                    }
                }
                None => elements.retain(|element| !evaluate(filter, element)),
            }
            elements.is_empty()
        }
        _ => false,
    };
    if now_empty {
        payload.remove(&key);
    }
}

/// The `field eq literal` pairs of an element selector, as an object.
pub(crate) fn selector_fields(filter: &Filter) -> Map<String, Value> {
    let mut fields = Map::new();
    collect_selector_fields(filter, &mut fields);
    fields
}

fn collect_selector_fields(filter: &Filter, fields: &mut Map<String, Value>) {
    match filter {
        Filter::Compare {
            attr,
            op: CompareOp::Eq,
            value: Some(value),
        } => {
            let value = match value {
                FilterValue::String(s) => Value::String(s.clone()),
                FilterValue::Bool(b) => Value::Bool(*b),
                FilterValue::Number(n) => match Number::from_f64(*n) {
                    Some(n) => Value::Number(n),
                    None => return,
                },
                FilterValue::Null => return,
            };
            fields.insert(attr.clone(), value);
        }
        Filter::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => {
            collect_selector_fields(left, fields);
            collect_selector_fields(right, fields);
        }
        _ => {}
    }
}
