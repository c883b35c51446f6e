//! SCIM filter push-down planning.
//!
//! [`plan`] translates a parsed [`Filter`] into a [`StoragePredicate`] the
//! store can execute natively, or refuses with an [`UnpushableReason`]. A
//! predicate is only produced when it selects exactly the records the
//! in-memory evaluator would select, so callers never have to re-check it.
//!
//! ## Rules
//!
//! - Comparisons push down only on attributes present in the [`ColumnMap`],
//!   and only with operators and literal types the column's [`ValueClass`]
//!   can honor without changing the answer.
//! - `and` / `or` push down only when both sides do. A one-sided predicate
//!   would drop the other side's filtering, so the whole node is refused.
//! - `not` and value paths (`emails[type eq "work"]`) never push down.
//!
//! Refusal is an ordinary outcome, not an error: [`build_filter`] turns it
//! into a [`QueryPlan`] with `fetch_all` set, and the caller evaluates the
//! filter over the full unfiltered set.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::{
    columns::{ColumnMap, ColumnSpec, ValueClass},
    evaluate::{evaluate, get_ignore_case, parse_bool_literal},
    filter::{CompareOp, Filter, FilterParseError, FilterValue, LogicalOp, parse_filter_with},
};
use crate::config::FilterConfig;

/// Column-level comparison operators a store executes natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOp {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ColumnOp {
    fn from_compare(op: CompareOp) -> Option<Self> {
        match op {
            CompareOp::Eq => Some(ColumnOp::Equals),
            CompareOp::Ne => Some(ColumnOp::NotEquals),
            CompareOp::Co => Some(ColumnOp::Contains),
            CompareOp::Sw => Some(ColumnOp::StartsWith),
            CompareOp::Ew => Some(ColumnOp::EndsWith),
            CompareOp::Gt => Some(ColumnOp::Gt),
            CompareOp::Ge => Some(ColumnOp::Gte),
            CompareOp::Lt => Some(ColumnOp::Lt),
            CompareOp::Le => Some(ColumnOp::Lte),
            CompareOp::Pr => None,
        }
    }
}

/// Literal bound into a column predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredicateValue {
    String(String),
    Bool(bool),
}

/// Storage-native predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePredicate {
    And(Box<StoragePredicate>, Box<StoragePredicate>),
    Or(Box<StoragePredicate>, Box<StoragePredicate>),
    /// `column <op> value`, optionally ignoring case on both sides
    Compare {
        column: String,
        op: ColumnOp,
        value: PredicateValue,
        case_insensitive: bool,
    },
    IsNull {
        column: String,
    },
    IsNotNull {
        column: String,
    },
    /// Column has a value; for text columns the empty string does not count
    Present {
        column: String,
        text: bool,
    },
}

impl StoragePredicate {
    /// Execute the predicate over a storage row (an object keyed by column).
    ///
    /// Follows SQL semantics for missing values: a comparison against a
    /// null or absent column is false, whatever the operator.
    pub fn matches(&self, row: &Value) -> bool {
        match self {
            StoragePredicate::And(left, right) => left.matches(row) && right.matches(row),
            StoragePredicate::Or(left, right) => left.matches(row) || right.matches(row),
            StoragePredicate::Compare {
                column,
                op,
                value,
                case_insensitive,
            } => match (column_value(row, column), value) {
                (Some(Value::String(actual)), PredicateValue::String(expected)) => {
                    if *case_insensitive {
                        compare_text(&actual.to_lowercase(), *op, &expected.to_lowercase())
                    } else {
                        compare_text(actual, *op, expected)
                    }
                }
                (Some(Value::Bool(actual)), PredicateValue::Bool(expected)) => match op {
                    ColumnOp::Equals => actual == expected,
                    ColumnOp::NotEquals => actual != expected,
                    _ => false,
                },
                _ => false,
            },
            StoragePredicate::IsNull { column } => column_value(row, column).is_none(),
            StoragePredicate::IsNotNull { column } => column_value(row, column).is_some(),
            StoragePredicate::Present { column, .. } => match column_value(row, column) {
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Array(items)) => !items.is_empty(),
                Some(Value::Object(fields)) => !fields.is_empty(),
                Some(_) => true,
                None => false,
            },
        }
    }

    pub fn and(left: StoragePredicate, right: StoragePredicate) -> Self {
        StoragePredicate::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: StoragePredicate, right: StoragePredicate) -> Self {
        StoragePredicate::Or(Box::new(left), Box::new(right))
    }
}

/// Non-null value of `column` in `row`.
fn column_value<'a>(row: &'a Value, column: &str) -> Option<&'a Value> {
    row.as_object()
        .and_then(|fields| get_ignore_case(fields, column))
        .filter(|value| !value.is_null())
}

fn compare_text(actual: &str, op: ColumnOp, expected: &str) -> bool {
    match op {
        ColumnOp::Equals => actual == expected,
        ColumnOp::NotEquals => actual != expected,
        ColumnOp::Contains => actual.contains(expected),
        ColumnOp::StartsWith => actual.starts_with(expected),
        ColumnOp::EndsWith => actual.ends_with(expected),
        ColumnOp::Gt => actual > expected,
        ColumnOp::Gte => actual >= expected,
        ColumnOp::Lt => actual < expected,
        ColumnOp::Lte => actual <= expected,
    }
}

/// Why a filter could not be pushed down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnpushableReason {
    /// No column backs the attribute
    UnmappedAttribute(String),
    /// The column's value class cannot honor the operator
    UnsupportedOperator { attr: String, op: CompareOp },
    /// The literal's type does not fit the column
    ValueTypeMismatch { attr: String },
    /// Case-insensitive semantics cannot be reproduced on a case-sensitive column
    CaseSensitiveColumn { attr: String },
    /// `not (...)`
    Negation,
    /// `attr[...]`
    ValuePath { attr: String },
}

impl fmt::Display for UnpushableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnpushableReason::UnmappedAttribute(attr) => {
                write!(f, "attribute '{}' has no storage column", attr)
            }
            UnpushableReason::UnsupportedOperator { attr, op } => {
                write!(f, "operator '{}' is not supported on '{}'", op, attr)
            }
            UnpushableReason::ValueTypeMismatch { attr } => {
                write!(f, "value type does not match column for '{}'", attr)
            }
            UnpushableReason::CaseSensitiveColumn { attr } => {
                write!(f, "column for '{}' compares case-sensitively", attr)
            }
            UnpushableReason::Negation => write!(f, "negation is evaluated in memory"),
            UnpushableReason::ValuePath { attr } => {
                write!(f, "value path on '{}' is evaluated in memory", attr)
            }
        }
    }
}

/// Outcome of planning a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum PushDown {
    /// The store can evaluate the whole filter natively
    Native(StoragePredicate),
    /// The caller must fetch everything and use the in-memory evaluator
    Unpushable(UnpushableReason),
}

impl PushDown {
    pub fn is_pushable(&self) -> bool {
        matches!(self, PushDown::Native(_))
    }

    pub fn predicate(&self) -> Option<&StoragePredicate> {
        match self {
            PushDown::Native(predicate) => Some(predicate),
            PushDown::Unpushable(_) => None,
        }
    }

    pub fn into_predicate(self) -> Option<StoragePredicate> {
        match self {
            PushDown::Native(predicate) => Some(predicate),
            PushDown::Unpushable(_) => None,
        }
    }
}

/// Plan `filter` against `columns`.
pub fn plan(filter: &Filter, columns: &ColumnMap) -> PushDown {
    match translate(filter, columns) {
        Ok(predicate) => PushDown::Native(predicate),
        Err(reason) => PushDown::Unpushable(reason),
    }
}

fn translate(filter: &Filter, columns: &ColumnMap) -> Result<StoragePredicate, UnpushableReason> {
    match filter {
        Filter::Compare { attr, op, value } => {
            let spec = columns
                .get(attr)
                .ok_or_else(|| UnpushableReason::UnmappedAttribute(attr.clone()))?;
            match (op, value) {
                (CompareOp::Pr, _) => Ok(StoragePredicate::Present {
                    column: spec.column.clone(),
                    text: spec.class != ValueClass::Boolean,
                }),
                (op, Some(value)) => translate_compare(attr, spec, *op, value),
                (_, None) => Err(UnpushableReason::ValueTypeMismatch { attr: attr.clone() }),
            }
        }
        // Both sides or nothing
        Filter::Logical { op, left, right } => {
            let left = translate(left, columns)?;
            let right = translate(right, columns)?;
            Ok(match op {
                LogicalOp::And => StoragePredicate::and(left, right),
                LogicalOp::Or => StoragePredicate::or(left, right),
            })
        }
        Filter::Not(_) => Err(UnpushableReason::Negation),
        Filter::ValuePath { attr, .. } => Err(UnpushableReason::ValuePath { attr: attr.clone() }),
    }
}

fn translate_compare(
    attr: &str,
    spec: &ColumnSpec,
    op: CompareOp,
    value: &FilterValue,
) -> Result<StoragePredicate, UnpushableReason> {
    let column = spec.column.clone();
    let unsupported = || UnpushableReason::UnsupportedOperator {
        attr: attr.to_string(),
        op,
    };
    let mismatch = || UnpushableReason::ValueTypeMismatch {
        attr: attr.to_string(),
    };

    let column_op = ColumnOp::from_compare(op).ok_or_else(unsupported)?;

    match (spec.class, value) {
        (_, FilterValue::Null) => match op {
            CompareOp::Eq => Ok(StoragePredicate::IsNull { column }),
            CompareOp::Ne => Ok(StoragePredicate::IsNotNull { column }),
            _ => Err(unsupported()),
        },

        (ValueClass::Boolean, FilterValue::Bool(_) | FilterValue::String(_)) => {
            if !matches!(column_op, ColumnOp::Equals | ColumnOp::NotEquals) {
                return Err(unsupported());
            }
            let flag = match value {
                FilterValue::Bool(b) => *b,
                FilterValue::String(s) => parse_bool_literal(s).ok_or_else(mismatch)?,
                _ => return Err(mismatch()),
            };
            Ok(StoragePredicate::Compare {
                column,
                op: column_op,
                value: PredicateValue::Bool(flag),
                case_insensitive: false,
            })
        }

        (ValueClass::CaseInsensitiveText | ValueClass::Identifier, FilterValue::String(s)) => {
            if op.is_substring() && !spec.class.is_text() {
                return Err(unsupported());
            }
            Ok(StoragePredicate::Compare {
                column,
                op: column_op,
                value: PredicateValue::String(s.clone()),
                case_insensitive: true,
            })
        }

        (ValueClass::ExactText, FilterValue::String(s)) => {
            if op.is_ordering() {
                return Err(unsupported());
            }
            // Without letters, case-folding cannot change the answer
            if !s.chars().all(|c| c.is_ascii() && !c.is_ascii_alphabetic()) {
                return Err(UnpushableReason::CaseSensitiveColumn {
                    attr: attr.to_string(),
                });
            }
            Ok(StoragePredicate::Compare {
                column,
                op: column_op,
                value: PredicateValue::String(s.clone()),
                case_insensitive: false,
            })
        }

        _ => Err(mismatch()),
    }
}

/// How a list query should be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    /// The parsed filter
    pub filter: Filter,
    /// Predicate for the store, when the whole filter pushes down
    pub predicate: Option<StoragePredicate>,
    /// Fetch the full unfiltered set and evaluate in memory
    pub fetch_all: bool,
}

impl QueryPlan {
    /// Whether `record` satisfies the filter.
    pub fn matches(&self, record: &Value) -> bool {
        evaluate(&self.filter, record)
    }

    /// Keep the records that satisfy the filter, in order.
    pub fn apply<'a, I>(&self, records: I) -> Vec<&'a Value>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        records
            .into_iter()
            .filter(|record| self.matches(record))
            .collect()
    }
}

/// Parse `input` and plan it against `columns` with the default limits.
///
/// # Example
///
/// ```
/// use scim_core::scim::{columns::ColumnMap, pushdown::build_filter};
///
/// let plan = build_filter("userName eq \"john@example.com\"", ColumnMap::user()).unwrap();
/// assert!(!plan.fetch_all);
///
/// let plan = build_filter("emails[type eq \"work\"]", ColumnMap::user()).unwrap();
/// assert!(plan.fetch_all);
/// ```
pub fn build_filter(input: &str, columns: &ColumnMap) -> Result<QueryPlan, FilterParseError> {
    build_filter_with(input, columns, &FilterConfig::default())
}

/// Parse `input` under `limits` and plan it against `columns`.
pub fn build_filter_with(
    input: &str,
    columns: &ColumnMap,
    limits: &FilterConfig,
) -> Result<QueryPlan, FilterParseError> {
    let filter = parse_filter_with(input, limits)?;

    match plan(&filter, columns) {
        PushDown::Native(predicate) => Ok(QueryPlan {
            filter,
            predicate: Some(predicate),
            fetch_all: false,
        }),
        PushDown::Unpushable(reason) => {
            tracing::debug!(
                filter = %filter,
                reason = %reason,
                "SCIM filter not pushable, evaluating in memory"
            );
            Ok(QueryPlan {
                filter,
                predicate: None,
                fetch_all: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::scim::filter::parse_filter;

    fn plan_user(filter: &str) -> PushDown {
        plan(&parse_filter(filter).unwrap(), ColumnMap::user())
    }

    fn compare(column: &str, op: ColumnOp, value: &str) -> StoragePredicate {
        StoragePredicate::Compare {
            column: column.into(),
            op,
            value: PredicateValue::String(value.into()),
            case_insensitive: true,
        }
    }

    #[test]
    fn test_simple_equality_pushes_down() {
        assert_eq!(
            plan_user("userName eq \"john@example.com\""),
            PushDown::Native(compare("user_name", ColumnOp::Equals, "john@example.com"))
        );
    }

    #[test]
    fn test_attribute_case_does_not_change_predicate() {
        assert_eq!(
            plan_user("UserName eq \"X\""),
            plan_user("username eq \"X\"")
        );
    }

    #[rstest]
    #[case("userName co \"jo\"", ColumnOp::Contains)]
    #[case("userName sw \"jo\"", ColumnOp::StartsWith)]
    #[case("displayName ew \"hn\"", ColumnOp::EndsWith)]
    #[case("displayName gt \"m\"", ColumnOp::Gt)]
    #[case("id ge \"m\"", ColumnOp::Gte)]
    #[case("id lt \"m\"", ColumnOp::Lt)]
    #[case("userName le \"m\"", ColumnOp::Lte)]
    #[case("id ne \"m\"", ColumnOp::NotEquals)]
    fn test_text_operators(#[case] filter: &str, #[case] expected: ColumnOp) {
        match plan_user(filter) {
            PushDown::Native(StoragePredicate::Compare {
                op,
                case_insensitive,
                ..
            }) => {
                assert_eq!(op, expected);
                assert!(case_insensitive);
            }
            other => panic!("Expected pushable compare for {}, got {:?}", filter, other),
        }
    }

    #[rstest]
    #[case("active eq true")]
    #[case("active eq \"True\"")]
    #[case("ACTIVE eq \"TRUE\"")]
    fn test_boolean_string_coercion(#[case] filter: &str) {
        assert_eq!(
            plan_user(filter),
            PushDown::Native(StoragePredicate::Compare {
                column: "active".into(),
                op: ColumnOp::Equals,
                value: PredicateValue::Bool(true),
                case_insensitive: false,
            })
        );
    }

    #[rstest]
    #[case::substring_on_boolean("active co \"t\"")]
    #[case::ordering_on_boolean("active gt false")]
    #[case::substring_on_identifier("id co \"abc\"")]
    #[case::ordering_on_exact_text("externalId gt \"100\"")]
    #[case::ordering_on_null("userName gt null")]
    fn test_unsupported_operators(#[case] filter: &str) {
        assert!(
            matches!(
                plan_user(filter),
                PushDown::Unpushable(UnpushableReason::UnsupportedOperator { .. })
            ),
            "{}",
            filter
        );
    }

    #[rstest]
    #[case::number_literal("userName eq 5")]
    #[case::bool_on_text("userName eq true")]
    #[case::non_bool_string("active eq \"yes\"")]
    #[case::number_on_boolean("active eq 1")]
    fn test_value_type_mismatch(#[case] filter: &str) {
        assert!(
            matches!(
                plan_user(filter),
                PushDown::Unpushable(UnpushableReason::ValueTypeMismatch { .. })
            ),
            "{}",
            filter
        );
    }

    #[test]
    fn test_exact_text_column() {
        assert_eq!(
            plan_user("externalId eq \"12345\""),
            PushDown::Native(StoragePredicate::Compare {
                column: "external_id".into(),
                op: ColumnOp::Equals,
                value: PredicateValue::String("12345".into()),
                case_insensitive: false,
            })
        );
        assert!(matches!(
            plan_user("externalId eq \"abc-1\""),
            PushDown::Unpushable(UnpushableReason::CaseSensitiveColumn { .. })
        ));
    }

    #[test]
    fn test_null_and_presence() {
        assert_eq!(
            plan_user("displayName eq null"),
            PushDown::Native(StoragePredicate::IsNull {
                column: "display_name".into()
            })
        );
        assert_eq!(
            plan_user("displayName ne null"),
            PushDown::Native(StoragePredicate::IsNotNull {
                column: "display_name".into()
            })
        );
        assert_eq!(
            plan_user("active pr"),
            PushDown::Native(StoragePredicate::Present {
                column: "active".into(),
                text: false
            })
        );
        assert_eq!(
            plan_user("userName pr"),
            PushDown::Native(StoragePredicate::Present {
                column: "user_name".into(),
                text: true
            })
        );
    }

    #[test]
    fn test_unmapped_attribute() {
        assert_eq!(
            plan_user("emails.value eq \"x@y.com\""),
            PushDown::Unpushable(UnpushableReason::UnmappedAttribute(
                "emails.value".into()
            ))
        );
    }

    #[test]
    fn test_not_and_value_path_never_push_down() {
        assert_eq!(
            plan_user("not (userName eq \"john\")"),
            PushDown::Unpushable(UnpushableReason::Negation)
        );
        assert_eq!(
            plan_user("emails[type eq \"work\"]"),
            PushDown::Unpushable(UnpushableReason::ValuePath {
                attr: "emails".into()
            })
        );
    }

    #[rstest]
    #[case("userName eq \"john\" and emails.value eq \"x\"")]
    #[case("emails.value eq \"x\" and userName eq \"john\"")]
    #[case("userName eq \"john\" or emails.value eq \"x\"")]
    #[case("emails.value eq \"x\" or userName eq \"john\"")]
    #[case("active eq true and (userName sw \"j\" or not (id eq \"1\"))")]
    fn test_logical_is_all_or_nothing(#[case] filter: &str) {
        assert!(!plan_user(filter).is_pushable(), "{}", filter);
    }

    #[test]
    fn test_logical_both_sides_pushable() {
        assert_eq!(
            plan_user("userName sw \"j\" and (active eq true or displayName pr)"),
            PushDown::Native(StoragePredicate::and(
                compare("user_name", ColumnOp::StartsWith, "j"),
                StoragePredicate::or(
                    StoragePredicate::Compare {
                        column: "active".into(),
                        op: ColumnOp::Equals,
                        value: PredicateValue::Bool(true),
                        case_insensitive: false,
                    },
                    StoragePredicate::Present {
                        column: "display_name".into(),
                        text: true
                    },
                ),
            ))
        );
    }

    #[test]
    fn test_predicate_matches_rows() {
        let row = json!({"user_name": "John@Example.com", "active": true, "display_name": null});

        assert!(compare("user_name", ColumnOp::Equals, "john@example.com").matches(&row));
        assert!(compare("user_name", ColumnOp::EndsWith, "EXAMPLE.COM").matches(&row));
        assert!(!compare("display_name", ColumnOp::NotEquals, "x").matches(&row));
        assert!(StoragePredicate::IsNull {
            column: "display_name".into()
        }
        .matches(&row));
        assert!(StoragePredicate::IsNull {
            column: "external_id".into()
        }
        .matches(&row));
        assert!(!StoragePredicate::Present {
            column: "display_name".into(),
            text: true
        }
        .matches(&row));

        let exact = StoragePredicate::Compare {
            column: "user_name".into(),
            op: ColumnOp::Equals,
            value: PredicateValue::String("john@example.com".into()),
            case_insensitive: false,
        };
        assert!(!exact.matches(&row));
    }

    #[test]
    fn test_build_filter_pushable() {
        let plan = build_filter("userName eq \"john@example.com\"", ColumnMap::user()).unwrap();
        assert!(!plan.fetch_all);
        assert_eq!(
            plan.predicate,
            Some(compare("user_name", ColumnOp::Equals, "john@example.com"))
        );
    }

    #[test]
    fn test_build_filter_falls_back_to_fetch_all() {
        let plan = build_filter(
            "userName eq \"john\" and emails.value eq \"x@y.com\"",
            ColumnMap::user(),
        )
        .unwrap();
        assert!(plan.fetch_all);
        assert!(plan.predicate.is_none());

        let records = [
            json!({"userName": "john", "emails": [{"value": "x@y.com"}]}),
            json!({"userName": "john", "emails": [{"value": "z@y.com"}]}),
            json!({"userName": "jane", "emails": [{"value": "x@y.com"}]}),
        ];
        let matched = plan.apply(&records);
        assert_eq!(matched, vec![&records[0]]);
    }

    #[test]
    fn test_build_filter_propagates_parse_errors() {
        assert!(build_filter("userName eq", ColumnMap::user()).is_err());
    }

    #[test]
    fn test_build_filter_with_limits() {
        let limits = FilterConfig {
            max_length: 8,
            max_depth: 4,
        };
        assert!(build_filter_with("userName pr", ColumnMap::user(), &limits).is_err());
        assert!(build_filter_with("id pr", ColumnMap::user(), &limits).is_ok());
    }

    #[test]
    fn test_predicate_serialization() {
        let json = serde_json::to_value(compare("user_name", ColumnOp::Equals, "john")).unwrap();
        assert_eq!(
            json,
            json!({
                "compare": {
                    "column": "user_name",
                    "op": "equals",
                    "value": "john",
                    "case_insensitive": true
                }
            })
        );
    }
}
