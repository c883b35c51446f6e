//! In-memory SCIM filter evaluation.
//!
//! [`evaluate`] walks a parsed [`Filter`] against a JSON resource record. It
//! is the fallback for filters the push-down planner refuses, and the ground
//! truth every pushed predicate has to agree with.
//!
//! Attribute lookup is case-insensitive. Dotted paths traverse nested objects
//! and fan out over multi-valued attributes, so `emails.value eq "x"` is true
//! when any email's `value` equals `"x"`. Paths prefixed with a schema URN
//! resolve against the record's URN-keyed extension object.

use serde_json::{Map, Value};

use super::{
    filter::{CompareOp, Filter, FilterValue, LogicalOp},
    types::{SCHEMA_GROUP, SCHEMA_USER},
};

/// Evaluate `filter` against `record`.
pub fn evaluate(filter: &Filter, record: &Value) -> bool {
    match filter {
        Filter::Compare {
            attr,
            op: CompareOp::Pr,
            ..
        } => resolve_attr(record, attr).into_iter().any(is_present),
        Filter::Compare {
            attr,
            op,
            value: Some(value),
        } => compare_attr(record, attr, *op, value),
        // Only `pr` is parsed without a value
        Filter::Compare { value: None, .. } => false,
        Filter::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => evaluate(left, record) && evaluate(right, record),
        Filter::Logical {
            op: LogicalOp::Or,
            left,
            right,
        } => evaluate(left, record) || evaluate(right, record),
        Filter::Not(inner) => !evaluate(inner, record),
        Filter::ValuePath { attr, filter } => lookup(record, attr)
            .into_iter()
            .filter_map(Value::as_array)
            .flatten()
            .any(|element| evaluate(filter, element)),
    }
}

/// Resolve an attribute path to the values it addresses, flattening
/// multi-valued attributes. Nulls are kept; callers decide what they mean.
pub fn resolve_attr<'a>(record: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut resolved = Vec::new();
    for value in lookup(record, path) {
        match value {
            Value::Array(items) => resolved.extend(items.iter()),
            other => resolved.push(other),
        }
    }
    resolved
}

/// Find `key` in `object`, preferring an exact match and falling back to a
/// case-insensitive one.
pub fn get_ignore_case<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn compare_attr(record: &Value, attr: &str, op: CompareOp, expected: &FilterValue) -> bool {
    let candidates = resolve_attr(record, attr);

    if *expected == FilterValue::Null {
        let has_value = candidates.iter().any(|v| !v.is_null());
        return match op {
            CompareOp::Eq => !has_value,
            CompareOp::Ne => has_value,
            _ => false,
        };
    }

    candidates
        .into_iter()
        .any(|actual| compare_value(actual, op, expected))
}

/// Compare a stored value against a filter literal.
///
/// The stored value's runtime type decides the comparison. Mismatched types
/// never match.
pub fn compare_value(actual: &Value, op: CompareOp, expected: &FilterValue) -> bool {
    match (actual, expected) {
        (Value::String(s), FilterValue::String(fs)) => compare_text(s, op, fs),
        (Value::Bool(b), FilterValue::Bool(fb)) => compare_bool(*b, op, *fb),
        (Value::Bool(b), FilterValue::String(fs)) => match parse_bool_literal(fs) {
            Some(fb) => compare_bool(*b, op, fb),
            None => false,
        },
        (Value::Number(n), FilterValue::Number(fn_)) => match n.as_f64() {
            Some(n) => compare_number(n, op, *fn_),
            None => false,
        },
        _ => false,
    }
}

/// Case-insensitive `"true"` / `"false"`.
pub fn parse_bool_literal(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn compare_text(actual: &str, op: CompareOp, expected: &str) -> bool {
    let actual = actual.to_lowercase();
    let expected = expected.to_lowercase();
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Co => actual.contains(&expected),
        CompareOp::Sw => actual.starts_with(&expected),
        CompareOp::Ew => actual.ends_with(&expected),
        CompareOp::Gt => actual > expected,
        CompareOp::Ge => actual >= expected,
        CompareOp::Lt => actual < expected,
        CompareOp::Le => actual <= expected,
        CompareOp::Pr => false,
    }
}

fn compare_bool(actual: bool, op: CompareOp, expected: bool) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        _ => false,
    }
}

fn compare_number(actual: f64, op: CompareOp, expected: f64) -> bool {
    match op {
        CompareOp::Eq => (actual - expected).abs() < f64::EPSILON,
        CompareOp::Ne => (actual - expected).abs() >= f64::EPSILON,
        CompareOp::Gt => actual > expected,
        CompareOp::Ge => actual >= expected,
        CompareOp::Lt => actual < expected,
        CompareOp::Le => actual <= expected,
        _ => false,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => true,
    }
}

/// Walk `path` through `record`. Arrays met before the last segment are
/// fanned out; the values at the last segment are returned as stored.
fn lookup<'a>(record: &'a Value, path: &str) -> Vec<&'a Value> {
    let (roots, rest) = match split_schema_prefix(record, path) {
        Some(split) => split,
        None => (vec![record], path),
    };

    if rest.is_empty() {
        return roots;
    }

    let mut current = roots;
    for segment in rest.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(fields) => next.extend(get_ignore_case(fields, segment)),
                Value::Array(items) => next.extend(
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .filter_map(|fields| get_ignore_case(fields, segment)),
                ),
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Split a URN-prefixed path into its starting value and the attribute path
/// beneath it. Core schema prefixes address the record itself; any other
/// prefix addresses the record key it names (longest match wins).
fn split_schema_prefix<'a, 'p>(
    record: &'a Value,
    path: &'p str,
) -> Option<(Vec<&'a Value>, &'p str)> {
    if !path
        .get(..4)
        .is_some_and(|p| p.eq_ignore_ascii_case("urn:"))
    {
        return None;
    }

    for core in [SCHEMA_USER, SCHEMA_GROUP] {
        if let Some(rest) = strip_urn_prefix(path, core) {
            return Some((vec![record], rest));
        }
    }

    let fields = record.as_object()?;
    let (value, rest) = fields
        .iter()
        .filter_map(|(key, value)| strip_urn_prefix(path, key).map(|rest| (key, value, rest)))
        .max_by_key(|(key, _, _)| key.len())
        .map(|(_, value, rest)| (value, rest))?;

    Some((vec![value], rest))
}

/// `path` minus `urn` and the following `:`, when `path` starts with `urn`
/// (ignoring ASCII case). A path equal to `urn` yields an empty rest.
fn strip_urn_prefix<'p>(path: &'p str, urn: &str) -> Option<&'p str> {
    let head = path.get(..urn.len())?;
    if !head.eq_ignore_ascii_case(urn) {
        return None;
    }
    match &path[urn.len()..] {
        "" => Some(""),
        rest => rest.strip_prefix(':'),
    }
}
