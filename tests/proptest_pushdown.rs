//! Property tests for the push-down planner.
//!
//! Verifies that a pushed storage predicate, run over the row a record
//! projects to, agrees with in-memory evaluation of the filter it came from.

use proptest::prelude::*;
use scim_core::scim::{
    ColumnMap, CompareOp, Filter, FilterValue, evaluate, parse_filter, plan,
};
use serde_json::{Map, Value};

// ============================================================================
// Generators
// ============================================================================

/// Attributes of a User record, mapped and unmapped
const ATTRS: &[&str] = &[
    "userName",
    "USERNAME",
    "displayName",
    "externalId",
    "active",
    "id",
    "title",
];

const OPS: &[CompareOp] = &[
    CompareOp::Eq,
    CompareOp::Ne,
    CompareOp::Co,
    CompareOp::Sw,
    CompareOp::Ew,
    CompareOp::Gt,
    CompareOp::Ge,
    CompareOp::Lt,
    CompareOp::Le,
];

/// Short strings over a mixed-case alphabet so case folding matters
fn arb_text() -> impl Strategy<Value = String> {
    "[aAbB1-][aAbB1-]{0,3}"
}

/// Letter-free strings, the only text pushed to exact-match columns
fn arb_digits() -> impl Strategy<Value = String> {
    "[0-9-]{0,4}"
}

fn arb_value() -> impl Strategy<Value = FilterValue> {
    prop_oneof![
        arb_text().prop_map(FilterValue::String),
        arb_digits().prop_map(FilterValue::String),
        any::<bool>().prop_map(FilterValue::Bool),
        prop_oneof![Just("true"), Just("FALSE"), Just("yes")]
            .prop_map(|s| FilterValue::String(s.to_string())),
        Just(FilterValue::Null),
        (0..10i32).prop_map(|n| FilterValue::Number(f64::from(n))),
    ]
}

fn arb_compare() -> impl Strategy<Value = Filter> {
    prop_oneof![
        4 => (
            prop::sample::select(ATTRS),
            prop::sample::select(OPS),
            arb_value()
        )
            .prop_map(|(attr, op, value)| Filter::compare(attr, op, value)),
        1 => prop::sample::select(ATTRS).prop_map(Filter::present),
    ]
}

/// Filters built from and/or/not over comparisons
fn arb_filter() -> impl Strategy<Value = Filter> {
    arb_compare().prop_recursive(4, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Filter::and(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Filter::or(l, r)),
            inner.prop_map(Filter::negate),
        ]
    })
}

/// Filters the planner can accept: no negation
fn arb_positive_filter() -> impl Strategy<Value = Filter> {
    arb_compare().prop_recursive(4, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Filter::and(l, r)),
            (inner.clone(), inner).prop_map(|(l, r)| Filter::or(l, r)),
        ]
    })
}

/// A User record whose mapped attributes hold scalar strings and a boolean
fn arb_record() -> impl Strategy<Value = Value> {
    (
        prop::option::of(arb_text()),
        prop::option::of(prop_oneof![arb_text(), Just(String::new())]),
        prop::option::of(prop_oneof![arb_digits(), arb_text()]),
        prop::option::of(any::<bool>()),
        prop::option::of(arb_text()),
        prop::option::of(arb_text()),
    )
        .prop_map(|(user_name, display_name, external_id, active, id, title)| {
            let mut record = Map::new();
            let mut put = |key: &str, value: Option<Value>| {
                if let Some(value) = value {
                    record.insert(key.to_string(), value);
                }
            };
            put("userName", user_name.map(Value::String));
            put("displayName", display_name.map(Value::String));
            put("externalId", external_id.map(Value::String));
            put("active", active.map(Value::Bool));
            put("id", id.map(Value::String));
            put("title", title.map(Value::String));
            Value::Object(record)
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Pushing down never changes which records match
    #[test]
    fn pushed_predicate_agrees_with_evaluator(
        filter in arb_positive_filter(),
        records in prop::collection::vec(arb_record(), 1..8),
    ) {
        let columns = ColumnMap::user();
        if let Some(predicate) = plan(&filter, columns).into_predicate() {
            for record in &records {
                let row = columns.project(record);
                prop_assert_eq!(
                    predicate.matches(&row),
                    evaluate(&filter, record),
                    "filter {} on {}",
                    filter,
                    record
                );
            }
        }
    }

    /// A logical node pushes down only when both sides do
    #[test]
    fn logical_push_down_is_all_or_nothing(
        left in arb_filter(),
        right in arb_filter(),
    ) {
        let columns = ColumnMap::user();
        let both = plan(&left, columns).is_pushable() && plan(&right, columns).is_pushable();

        prop_assert_eq!(plan(&Filter::and(left.clone(), right.clone()), columns).is_pushable(), both);
        prop_assert_eq!(plan(&Filter::or(left, right), columns).is_pushable(), both);
    }

    /// Negation is always evaluated in memory
    #[test]
    fn negation_never_pushes_down(filter in arb_filter()) {
        prop_assert!(!plan(&Filter::negate(filter), ColumnMap::user()).is_pushable());
    }

    /// Rendering a filter and parsing it back gives the same tree
    #[test]
    fn display_round_trips(filter in arb_filter()) {
        let rendered = filter.to_string();
        let parsed = parse_filter(&rendered);
        prop_assert!(parsed.is_ok(), "{} failed to parse: {:?}", rendered, parsed);
        prop_assert_eq!(parsed.unwrap(), filter);
    }
}
