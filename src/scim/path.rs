//! SCIM PATCH path resolution.
//!
//! Classifies the `path` of a PATCH operation (RFC 7644 Section 3.5.2) into
//! one of five addressing modes:
//!
//! ```text
//! (absent)                                              -> NoPath
//! displayName                                           -> Simple
//! emails[type eq "work"].value                          -> ValuePath
//! urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager.value
//!                                                       -> Extension
//! name.givenName                                        -> DotNotation (when enabled)
//! ```
//!
//! Fully qualified core-schema paths (`urn:ietf:params:scim:schemas:core:2.0:User:userName`)
//! resolve as if the prefix were absent.

use std::fmt;

use super::{
    filter::{CompareOp, Filter, LogicalOp, parse_filter},
    patch::PatchError,
    types::{SCHEMA_GROUP, SCHEMA_USER, canonical_attribute},
};
use crate::config::PatchConfig;

/// A resolved PATCH target.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchPath {
    /// No path; the value is merged at the top level
    NoPath,
    /// A top-level attribute (canonical spelling when known)
    Simple { attr: String },
    /// Elements of a multi-valued attribute selected by an equality filter
    ValuePath {
        attr: String,
        filter: Filter,
        sub_attr: Option<String>,
    },
    /// An attribute inside a schema extension object; `attr` may be dotted
    Extension { urn: String, attr: String },
    /// A sub-attribute of a complex attribute
    DotNotation { parent: String, child: String },
}

impl PatchPath {
    /// Short name of the addressing mode, for logs.
    pub fn mode(&self) -> &'static str {
        match self {
            PatchPath::NoPath => "no_path",
            PatchPath::Simple { .. } => "simple",
            PatchPath::ValuePath { .. } => "value_path",
            PatchPath::Extension { .. } => "extension",
            PatchPath::DotNotation { .. } => "dot_notation",
        }
    }
}

impl fmt::Display for PatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchPath::NoPath => Ok(()),
            PatchPath::Simple { attr } => write!(f, "{}", attr),
            PatchPath::ValuePath {
                attr,
                filter,
                sub_attr,
            } => {
                write!(f, "{}[{}]", attr, filter)?;
                if let Some(sub) = sub_attr {
                    write!(f, ".{}", sub)?;
                }
                Ok(())
            }
            PatchPath::Extension { urn, attr } => write!(f, "{}:{}", urn, attr),
            PatchPath::DotNotation { parent, child } => write!(f, "{}.{}", parent, child),
        }
    }
}

/// Resolve an operation path.
///
/// `known` is the canonical attribute table of the resource type; simple and
/// parent names matching it case-insensitively are returned in canonical
/// spelling, anything else verbatim.
///
/// # Errors
///
/// [`PatchError::InvalidPath`] for malformed value filters, filters other than
/// equality on element fields, empty extension sub-attributes, and stray
/// brackets.
///
/// # Examples
///
/// ```
/// use scim_core::{
///     config::PatchConfig,
///     scim::{path::{PatchPath, resolve_path}, types::USER_ATTRIBUTES},
/// };
///
/// let config = PatchConfig::default();
/// let path = resolve_path(Some("DISPLAYNAME"), USER_ATTRIBUTES, &config).unwrap();
/// assert_eq!(path, PatchPath::Simple { attr: "displayName".into() });
/// ```
pub fn resolve_path(
    path: Option<&str>,
    known: &[&str],
    config: &PatchConfig,
) -> Result<PatchPath, PatchError> {
    let path = match path.map(str::trim) {
        None | Some("") => return Ok(PatchPath::NoPath),
        Some(path) => path,
    };

    if has_urn_prefix(path) {
        return resolve_urn_path(path, known, config);
    }

    if path.contains('[') {
        return resolve_value_path(path, known);
    }

    check_name(path)?;

    if config.verbose_dot_notation
        && let Some((parent, child)) = path.split_once('.')
    {
        if parent.is_empty() || child.is_empty() {
            return Err(PatchError::InvalidPath(format!(
                "Empty attribute name in '{}'",
                path
            )));
        }
        return Ok(PatchPath::DotNotation {
            parent: canonical(known, parent),
            child: child.to_string(),
        });
    }

    Ok(PatchPath::Simple {
        attr: canonical(known, path),
    })
}

fn canonical(known: &[&str], attr: &str) -> String {
    canonical_attribute(known, attr)
        .unwrap_or(attr)
        .to_string()
}

fn has_urn_prefix(path: &str) -> bool {
    path.get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
}

fn check_name(name: &str) -> Result<(), PatchError> {
    if name.is_empty()
        || name
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '[' | ']' | '"'))
    {
        return Err(PatchError::InvalidPath(format!(
            "Invalid attribute name '{}'",
            name
        )));
    }
    Ok(())
}

/// `attr[filter]` or `attr[filter].sub`
fn resolve_value_path(path: &str, known: &[&str]) -> Result<PatchPath, PatchError> {
    let (attr, rest) = path
        .split_once('[')
        .ok_or_else(|| PatchError::InvalidPath(format!("Expected '[' in '{}'", path)))?;
    let attr = attr.trim();
    check_name(attr)?;

    let close = find_closing_bracket(rest)
        .ok_or_else(|| PatchError::InvalidPath(format!("Unclosed bracket in '{}'", path)))?;
    let filter_str = &rest[..close];
    let after = &rest[close + 1..];

    let filter = parse_filter(filter_str)
        .map_err(|e| PatchError::InvalidPath(format!("Invalid value filter: {}", e)))?;

    if !is_element_selector(&filter) {
        return Err(PatchError::InvalidPath(format!(
            "Value filter '{}' must compare element fields with 'eq'",
            filter_str
        )));
    }

    let sub_attr = match after {
        "" => None,
        _ => {
            let sub = after.strip_prefix('.').ok_or_else(|| {
                PatchError::InvalidPath(format!(
                    "Unexpected characters after filter: '{}'",
                    after
                ))
            })?;
            check_name(sub)?;
            if sub.contains('.') {
                return Err(PatchError::InvalidPath(format!(
                    "Nested sub-attribute '{}' is not supported",
                    sub
                )));
            }
            Some(sub.to_string())
        }
    };

    Ok(PatchPath::ValuePath {
        attr: canonical(known, attr),
        filter,
        sub_attr,
    })
}

/// Byte offset of the `]` closing the filter, skipping quoted strings.
fn find_closing_bracket(s: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ']' => return Some(i),
            '[' => return None,
            _ => {}
        }
    }
    None
}

/// Equality comparisons on plain element fields, optionally joined by `and`.
fn is_element_selector(filter: &Filter) -> bool {
    match filter {
        Filter::Compare {
            attr,
            op: CompareOp::Eq,
            value: Some(_),
        } => !attr.contains('.') && !attr.contains(':'),
        Filter::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => is_element_selector(left) && is_element_selector(right),
        _ => false,
    }
}

fn resolve_urn_path(
    path: &str,
    known: &[&str],
    config: &PatchConfig,
) -> Result<PatchPath, PatchError> {
    // Core schema prefixes address the resource itself
    for core in [SCHEMA_USER, SCHEMA_GROUP] {
        if let Some(rest) = strip_schema(path, core) {
            if rest.is_empty() || has_urn_prefix(rest) {
                return Err(PatchError::InvalidPath(format!(
                    "Missing attribute after schema '{}'",
                    core
                )));
            }
            return resolve_path(Some(rest), known, config);
        }
    }

    let configured = config
        .extension_schemas
        .iter()
        .filter_map(|urn| strip_schema(path, urn).map(|rest| (urn.as_str(), rest)))
        .max_by_key(|(urn, _)| urn.len());

    let (urn, attr) = match configured {
        Some((urn, "")) if path.len() == urn.len() => {
            return Ok(PatchPath::Simple {
                attr: urn.to_string(),
            });
        }
        Some(found) => found,
        None => {
            let (urn, attr) = path.rsplit_once(':').ok_or_else(|| {
                PatchError::InvalidPath(format!("Invalid schema path '{}'", path))
            })?;
            if urn.len() <= "urn".len() {
                return Err(PatchError::InvalidPath(format!(
                    "Invalid schema path '{}'",
                    path
                )));
            }
            // Schema URNs end in a resource type name (`...:2.0:User`),
            // attribute names are camelCase
            if attr.starts_with(|c: char| c.is_ascii_uppercase()) {
                return Ok(PatchPath::Simple {
                    attr: path.to_string(),
                });
            }
            (urn, attr)
        }
    };

    if attr.is_empty() {
        return Err(PatchError::InvalidPath(format!(
            "Missing attribute after schema '{}'",
            urn
        )));
    }
    if attr.contains('[') || attr.contains(']') {
        return Err(PatchError::InvalidPath(format!(
            "Value filters are not supported in extension path '{}'",
            path
        )));
    }
    check_name(attr)?;
    if attr.split('.').any(str::is_empty) {
        return Err(PatchError::InvalidPath(format!(
            "Empty attribute name in '{}'",
            path
        )));
    }

    Ok(PatchPath::Extension {
        urn: urn.to_string(),
        attr: attr.to_string(),
    })
}

/// The part of `path` after `urn` and its `:` separator, when `path` starts
/// with `urn` (ignoring ASCII case). A path equal to `urn` yields `""`.
fn strip_schema<'p>(path: &'p str, urn: &str) -> Option<&'p str> {
    let head = path.get(..urn.len())?;
    if !head.eq_ignore_ascii_case(urn) {
        return None;
    }
    match &path[urn.len()..] {
        "" => Some(""),
        rest => rest.strip_prefix(':'),
    }
}
