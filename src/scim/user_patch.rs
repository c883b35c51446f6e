//! PATCH engine for SCIM Users.
//!
//! [`apply_user_patch`] folds a batch of operations over a [`UserPatchState`]
//! and returns the next state, or the first failure. The input state is never
//! modified, so a failed batch leaves nothing half-applied.
//!
//! `userName`, `displayName`, `externalId` and `active` live in dedicated
//! fields. Everything else (emails, name, extension objects, ...) lives in the
//! free-form `attributes` payload. Server-managed keys are stripped from the
//! payload after every batch so they can never shadow the dedicated fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    evaluate::parse_bool_literal,
    patch::{
        PatchError, PatchOpKind, PatchOperation, find_key, remove_path, set_path, strip_keys,
    },
    path::{PatchPath, resolve_path},
    types::{USER_ATTRIBUTES, USER_SERVER_MANAGED},
};
use crate::config::PatchConfig;

/// Mutable fields of a SCIM User.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct UserPatchState {
    pub user_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    pub active: bool,

    /// Every other attribute, keyed as stored
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl UserPatchState {
    /// An active user with no other attributes.
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            display_name: None,
            external_id: None,
            active: true,
            attributes: Map::new(),
        }
    }
}

/// Apply `operations` in order to a copy of `state`.
///
/// # Errors
///
/// - [`PatchError::InvalidValue`] for an unsupported op, a missing value, or
///   a value of the wrong shape for its target
/// - [`PatchError::InvalidPath`] for a path that cannot be resolved
/// - [`PatchError::NoTarget`] for `remove` without a path
pub fn apply_user_patch(
    state: &UserPatchState,
    operations: &[PatchOperation],
    config: &PatchConfig,
) -> Result<UserPatchState, PatchError> {
    let mut next = state.clone();

    for operation in operations {
        apply_operation(&mut next, operation, config)?;
    }

    strip_keys(&mut next.attributes, USER_SERVER_MANAGED);
    Ok(next)
}

fn apply_operation(
    state: &mut UserPatchState,
    operation: &PatchOperation,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    let kind = operation.kind()?;
    let path = resolve_path(operation.path.as_deref(), USER_ATTRIBUTES, config)?;

    tracing::debug!(
        op = kind.as_str(),
        path = %path,
        mode = path.mode(),
        "Applying SCIM user patch operation"
    );

    match kind {
        PatchOpKind::Remove => remove(state, &path),
        PatchOpKind::Add | PatchOpKind::Replace => {
            let value = operation.value.clone().ok_or_else(|| {
                PatchError::InvalidValue(format!("'{}' operation requires a value", kind.as_str()))
            })?;
            set(state, &path, kind, value, config)
        }
    }
}

fn set(
    state: &mut UserPatchState,
    path: &PatchPath,
    kind: PatchOpKind,
    value: Value,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    match path {
        PatchPath::NoPath => merge(state, kind, value, config),
        PatchPath::Simple { attr } => match attr.as_str() {
            "userName" => {
                state.user_name = match value {
                    Value::String(s) if !s.trim().is_empty() => s,
                    other => {
                        return Err(PatchError::InvalidValue(format!(
                            "userName must be a non-empty string, got {}",
                            other
                        )));
                    }
                };
                Ok(())
            }
            "displayName" => {
                state.display_name = nullable_string("displayName", value)?;
                Ok(())
            }
            "externalId" => {
                state.external_id = nullable_string("externalId", value)?;
                Ok(())
            }
            "active" => {
                state.active = coerce_active(&value)?;
                Ok(())
            }
            _ => set_path(&mut state.attributes, path, kind, value),
        },
        _ => set_path(&mut state.attributes, path, kind, value),
    }
}

/// No-path add/replace: each key is resolved like a path and applied.
fn merge(
    state: &mut UserPatchState,
    kind: PatchOpKind,
    value: Value,
    config: &PatchConfig,
) -> Result<(), PatchError> {
    let Value::Object(fields) = value else {
        return Err(PatchError::InvalidValue(
            "operation without a path requires an object value".into(),
        ));
    };

    for (key, value) in fields {
        if key.eq_ignore_ascii_case("schemas") {
            continue;
        }
        match resolve_path(Some(key.as_str()), USER_ATTRIBUTES, config) {
            Ok(PatchPath::NoPath) => {}
            Ok(path) => set(state, &path, kind, value, config)?,
            // Keys that are not valid paths are kept verbatim
            Err(_) => {
                let stored = find_key(&state.attributes, &key).unwrap_or(key);
                state.attributes.insert(stored, value);
            }
        }
    }
    Ok(())
}

fn remove(state: &mut UserPatchState, path: &PatchPath) -> Result<(), PatchError> {
    match path {
        PatchPath::NoPath => Err(PatchError::NoTarget(
            "remove operation requires a path".into(),
        )),
        PatchPath::Simple { attr } => match attr.as_str() {
            "userName" => Err(PatchError::InvalidValue(
                "userName is required and cannot be removed".into(),
            )),
            "displayName" => {
                state.display_name = None;
                Ok(())
            }
            "externalId" => {
                state.external_id = None;
                Ok(())
            }
            "active" => {
                state.active = false;
                Ok(())
            }
            _ => remove_path(&mut state.attributes, path),
        },
        _ => remove_path(&mut state.attributes, path),
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

/// Accepts `true`/`false`, the strings `"true"`/`"false"` in any case, and
/// `{"active": <either>}`.
fn coerce_active(value: &Value) -> Result<bool, PatchError> {
    let flag = match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => parse_bool_literal(s),
        Value::Object(fields) => match find_key(fields, "active").and_then(|k| fields.get(&k)) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::String(s)) => parse_bool_literal(s),
            _ => None,
        },
        _ => None,
    };
    flag.ok_or_else(|| {
        PatchError::InvalidValue(format!("active must be a boolean, got {}", value))
    })
}
