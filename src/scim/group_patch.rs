//! PATCH engine for SCIM Groups.
//!
//! [`apply_group_patch`] folds a batch of operations over a
//! [`GroupPatchState`], with the same all-or-nothing contract as the User
//! engine. On top of `displayName` and `externalId` it reconciles the member
//! list:
//!
//! - members are identified by `value`; after every operation no two members
//!   share one, and the last occurrence of a duplicate wins
//! - adding (or removing by explicit list) more than one member in a single
//!   operation requires [`PatchConfig::allow_multi_member_add`]
//! - `remove members` with no value clears the list only when
//!   [`PatchConfig::allow_remove_all_members`] is set
//! - `members[value eq "X"]` addresses exactly one member; `.display` and
//!   `.type` sub-attributes can be set or cleared through it

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    evaluate::evaluate,
    filter::Filter,
    patch::{
        PatchError, PatchOpKind, PatchOperation, find_key, remove_path, set_path, strip_keys,
    },
    path::{PatchPath, resolve_path},
    types::{GROUP_ATTRIBUTES, GROUP_SERVER_MANAGED, GroupMember},
};
use crate::config::PatchConfig;

/// Mutable fields of a SCIM Group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct GroupPatchState {
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    /// Ordered, unique by `value`
    #[serde(default)]
    pub members: Vec<GroupMember>,

    /// Every other attribute, keyed as stored
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl GroupPatchState {
    /// A group with no members or other attributes.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            external_id: None,
            members: Vec::new(),
            attributes: Map::new(),
        }
    }
}

/// Apply `operations` in order to a copy of `state`.
///
/// # Errors
///
/// - [`PatchError::InvalidValue`] for an unsupported op, a malformed member,
///   a multi-member batch the configuration does not allow, or a value of the
///   wrong shape for its target
/// - [`PatchError::InvalidPath`] for paths a Group does not support
/// - [`PatchError::NoTarget`] for `remove` without a path, or a member filter
///   that selects nothing on add/replace
pub fn apply_group_patch(
    state: &GroupPatchState,
    operations: &[PatchOperation],
    config: &PatchConfig,
) -> Result<GroupPatchState, PatchError> {
    let mut next = state.clone();

    for operation in operations {
        apply_operation(&mut next, operation, config)?;
    }

    next.members = dedupe(next.members);
    strip_keys(&mut next.attributes, GROUP_SERVER_MANAGED);
    Ok(next)
}

fn apply_operation(
    state: &mut GroupPatchState,
    operation: &PatchOperation,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    let kind = operation.kind()?;
    let path = resolve_path(operation.path.as_deref(), GROUP_ATTRIBUTES, config)?;

    tracing::debug!(
        op = kind.as_str(),
        path = %path,
        mode = path.mode(),
        members = state.members.len(),
        "Applying SCIM group patch operation"
    );

    let value = operation.value.clone();

    match (kind, &path) {
        (PatchOpKind::Remove, PatchPath::NoPath) => Err(PatchError::NoTarget(
            "remove operation requires a path".into(),
        )),
        (PatchOpKind::Remove, _) => remove(state, &path, value, config),
        (_, _) => {
            let value = value.ok_or_else(|| {
                PatchError::InvalidValue(format!("'{}' operation requires a value", kind.as_str()))
            })?;
            set(state, &path, kind, value, config)
        }
    }
}

fn set(
    state: &mut GroupPatchState,
    path: &PatchPath,
    kind: PatchOpKind,
    value: Value,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    match path {
        PatchPath::NoPath => set_without_path(state, kind, value, config),
        PatchPath::Simple { attr } => match attr.as_str() {
            "displayName" => {
                state.display_name = display_name(value)?;
                Ok(())
            }
            "externalId" => {
                state.external_id = nullable_string("externalId", value)?;
                Ok(())
            }
            "members" => match kind {
                PatchOpKind::Replace => {
                    let Value::Array(_) = value else {
                        return Err(PatchError::InvalidValue(
                            "replacing members requires an array".into(),
                        ));
                    };
                    state.members = dedupe(normalize_members(value)?);
                    Ok(())
                }
                _ => add_members(state, value, config),
            },
            _ if is_schema_urn(attr) => set_path(&mut state.attributes, path, kind, value),
            _ => Err(unsupported_path(path)),
        },
        PatchPath::ValuePath {
            attr,
            filter,
            sub_attr,
        } if attr == "members" => set_member(state, filter, sub_attr.as_deref(), value),
        PatchPath::Extension { .. } => set_path(&mut state.attributes, path, kind, value),
        _ => Err(unsupported_path(path)),
    }
}

/// No-path add/replace.
///
/// A string renames the group; an array (or a single member object on add)
/// is a member list; any other object updates the named attributes.
fn set_without_path(
    state: &mut GroupPatchState,
    kind: PatchOpKind,
    value: Value,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    match value {
        Value::String(_) if kind == PatchOpKind::Replace => {
            state.display_name = display_name(value)?;
            Ok(())
        }
        Value::Array(_) => match kind {
            PatchOpKind::Replace => {
                state.members = dedupe(normalize_members(value)?);
                Ok(())
            }
            _ => add_members(state, value, config),
        },
        Value::Object(fields) if kind == PatchOpKind::Add && is_member_object(&fields) => {
            add_members(state, Value::Object(fields), config)
        }
        Value::Object(fields) => {
            for (key, value) in fields {
                if key.eq_ignore_ascii_case("schemas") {
                    continue;
                }
                match resolve_path(Some(key.as_str()), GROUP_ATTRIBUTES, config) {
                    Ok(PatchPath::NoPath) => {}
                    Ok(path @ PatchPath::Simple { .. }) | Ok(path @ PatchPath::Extension { .. }) => {
                        set_attribute_from_object(state, &path, kind, value, config)?
                    }
                    _ => {
                        let stored = find_key(&state.attributes, &key).unwrap_or(key);
                        state.attributes.insert(stored, value);
                    }
                }
            }
            Ok(())
        }
        other => Err(PatchError::InvalidValue(format!(
            "unsupported value for '{}' without a path: {}",
            kind.as_str(),
            other
        ))),
    }
}

/// A key of a no-path object value. Group attributes go through [`set`];
/// anything else is merged into the payload.
fn set_attribute_from_object(
    state: &mut GroupPatchState,
    path: &PatchPath,
    kind: PatchOpKind,
    value: Value,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    match path {
        PatchPath::Simple { attr }
            if matches!(attr.as_str(), "displayName" | "externalId" | "members")
                || is_schema_urn(attr) =>
        {
            set(state, path, kind, value, config)
        }
        PatchPath::Extension { .. } => set(state, path, kind, value, config),
        _ => set_path(&mut state.attributes, path, kind, value),
    }
}

fn remove(
    state: &mut GroupPatchState,
    path: &PatchPath,
    value: Option<Value>,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    match path {
        PatchPath::Simple { attr } => match attr.as_str() {
            "displayName" => Err(PatchError::InvalidValue(
                "displayName is required and cannot be removed".into(),
            )),
            "externalId" => {
                state.external_id = None;
                Ok(())
            }
            "members" => match value {
                Some(value) => remove_listed_members(state, value, config),
                None if config.allow_remove_all_members => {
                    tracing::debug!(
                        removed = state.members.len(),
                        "Removing all group members"
                    );
                    state.members.clear();
                    Ok(())
                }
                None => Err(PatchError::InvalidValue(
                    "removing all members is not allowed".into(),
                )),
            },
            _ if is_schema_urn(attr) => remove_path(&mut state.attributes, path),
            _ => Err(unsupported_path(path)),
        },
        PatchPath::ValuePath {
            attr,
            filter,
            sub_attr,
        } if attr == "members" => remove_member(state, filter, sub_attr.as_deref()),
        PatchPath::Extension { .. } => remove_path(&mut state.attributes, path),
        _ => Err(unsupported_path(path)),
    }
}

fn add_members(
    state: &mut GroupPatchState,
    value: Value,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    let incoming = normalize_members(value)?;
    check_batch_size(incoming.len(), config)?;

    let mut members = std::mem::take(&mut state.members);
    members.extend(incoming);
    state.members = dedupe(members);
    Ok(())
}

fn remove_listed_members(
    state: &mut GroupPatchState,
    value: Value,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    let listed = normalize_members(value)?;
    check_batch_size(listed.len(), config)?;

    let values: HashSet<&str> = listed.iter().map(|m| m.value.as_str()).collect();
    state
        .members
        .retain(|member| !values.contains(member.value.as_str()));
    Ok(())
}

/// `members[filter]` add/replace.
fn set_member(
    state: &mut GroupPatchState,
    filter: &Filter,
    sub_attr: Option<&str>,
    value: Value,
) -> Result<(), PatchError> {
    let index = find_member(&state.members, filter)
        .ok_or_else(|| PatchError::NoTarget(format!("no member matches '{}'", filter)))?;

    match sub_attr {
        None => {
            let replacement = normalize_member(value)?;
            state.members[index] = replacement;
            state.members = dedupe(std::mem::take(&mut state.members));
        }
        Some(sub) => {
            let member = &mut state.members[index];
            match sub.to_ascii_lowercase().as_str() {
                "display" => member.display = nullable_string("display", value)?,
                "type" => member.member_type = nullable_string("type", value)?,
                _ => return Err(unsupported_member_attribute(sub)),
            }
        }
    }
    Ok(())
}

/// `members[filter]` remove: takes out one matching member, or clears a
/// sub-attribute on it. Matching nothing is a no-op.
fn remove_member(
    state: &mut GroupPatchState,
    filter: &Filter,
    sub_attr: Option<&str>,
) -> Result<(), PatchError> {
    let Some(index) = find_member(&state.members, filter) else {
        tracing::debug!(filter = %filter, "No group member matched remove filter");
        return Ok(());
    };

    match sub_attr {
        None => {
            state.members.remove(index);
        }
        Some(sub) => {
            let member = &mut state.members[index];
            match sub.to_ascii_lowercase().as_str() {
                "display" => member.display = None,
                "type" => member.member_type = None,
                _ => return Err(unsupported_member_attribute(sub)),
            }
        }
    }
    Ok(())
}

fn find_member(members: &[GroupMember], filter: &Filter) -> Option<usize> {
    members
        .iter()
        .position(|member| evaluate(filter, &member_json(member)))
}

fn member_json(member: &GroupMember) -> Value {
    let mut fields = Map::new();
    fields.insert("value".into(), Value::String(member.value.clone()));
    if let Some(display) = &member.display {
        fields.insert("display".into(), Value::String(display.clone()));
    }
    if let Some(member_type) = &member.member_type {
        fields.insert("type".into(), Value::String(member_type.clone()));
    }
    Value::Object(fields)
}

fn check_batch_size(count: usize, config: &PatchConfig) -> Result<(), PatchError> {
    if count > 1 && !config.allow_multi_member_add {
        return Err(PatchError::InvalidValue(format!(
            "operation lists {} members but only one member per operation is allowed",
            count
        )));
    }
    Ok(())
}

/// Parse a member list (or a single member object).
fn normalize_members(value: Value) -> Result<Vec<GroupMember>, PatchError> {
    match value {
        Value::Array(items) => items.into_iter().map(normalize_member).collect(),
        object @ Value::Object(_) => Ok(vec![normalize_member(object)?]),
        other => Err(PatchError::InvalidValue(format!(
            "members must be an array of objects, got {}",
            other
        ))),
    }
}

fn normalize_member(value: Value) -> Result<GroupMember, PatchError> {
    let Value::Object(mut fields) = value else {
        return Err(PatchError::InvalidValue(format!(
            "member must be an object, got {}",
            value
        )));
    };

    let member_value = match take_ignore_case(&mut fields, "value") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => {
            return Err(PatchError::InvalidValue(
                "member must carry a non-empty string 'value'".into(),
            ));
        }
    };

    let display = match take_ignore_case(&mut fields, "display") {
        Some(value) => nullable_string("display", value)?,
        None => None,
    };
    let member_type = match take_ignore_case(&mut fields, "type") {
        Some(value) => nullable_string("type", value)?,
        None => None,
    };

    Ok(GroupMember {
        value: member_value,
        display,
        member_type,
    })
}

/// Keep the last occurrence of each `value`, in the order those last
/// occurrences appear.
fn dedupe(members: Vec<GroupMember>) -> Vec<GroupMember> {
    let mut seen = HashSet::new();
    let mut unique: Vec<GroupMember> = members
        .into_iter()
        .rev()
        .filter(|member| seen.insert(member.value.clone()))
        .collect();
    unique.reverse();
    unique
}

fn is_member_object(fields: &Map<String, Value>) -> bool {
    find_key(fields, "value").is_some() && find_key(fields, "members").is_none()
}

fn take_ignore_case(fields: &mut Map<String, Value>, name: &str) -> Option<Value> {
    let key = find_key(fields, name)?;
    fields.remove(&key)
}

fn is_schema_urn(attr: &str) -> bool {
    attr.get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
}

fn display_name(value: Value) -> Result<String, PatchError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        other => Err(PatchError::InvalidValue(format!(
            "displayName must be a non-empty string, got {}",
            other
        ))),
    }
}

fn nullable_string(attr: &str, value: Value) -> Result<Option<String>, PatchError> {
    match value {
        Value::String(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => Err(PatchError::InvalidValue(format!(
            "{} must be a string or null, got {}",
            attr, other
        ))),
    }
}

fn unsupported_path(path: &PatchPath) -> PatchError {
    PatchError::InvalidPath(format!("'{}' is not a supported Group path", path))
}

fn unsupported_member_attribute(sub: &str) -> PatchError {
    PatchError::InvalidPath(format!("member sub-attribute '{}' cannot be modified", sub))
}
