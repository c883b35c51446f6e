//! Rendering of storage predicates as SQL `WHERE` fragments.
//!
//! The planner decides *whether* a filter pushes down; this module only spells
//! an already-approved [`StoragePredicate`] in SQL with positional `?`
//! bindings. Column identifiers are emitted verbatim, so a mapping may use
//! qualified names such as `m.display_name`.
//!
//! Case-insensitive comparisons wrap both sides in `LOWER(...)`; substring
//! operators become `LIKE` patterns with `%`, `_` and `\` escaped.

use super::pushdown::{ColumnOp, PredicateValue, StoragePredicate};

/// Result of rendering a predicate to SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    /// SQL WHERE clause fragment (e.g., "LOWER(user_name) = LOWER(?)")
    pub where_clause: String,
    /// Bind values in order
    pub bindings: Vec<SqlValue>,
}

/// SQL bind value types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Bool(bool),
}

impl StoragePredicate {
    /// Render as a parameterized SQL `WHERE` fragment.
    ///
    /// # Example
    ///
    /// ```
    /// use scim_core::scim::{columns::ColumnMap, pushdown::build_filter};
    ///
    /// let plan = build_filter("userName sw \"j\"", ColumnMap::user()).unwrap();
    /// let sql = plan.predicate.unwrap().to_sql();
    /// assert_eq!(sql.where_clause, "LOWER(user_name) LIKE LOWER(?) ESCAPE '\\'");
    /// ```
    pub fn to_sql(&self) -> SqlFilter {
        let mut ctx = TranslationContext::new();
        let where_clause = ctx.translate(self);
        SqlFilter {
            where_clause,
            bindings: ctx.bindings,
        }
    }
}

/// Internal context for building SQL fragments.
struct TranslationContext {
    bindings: Vec<SqlValue>,
}

impl TranslationContext {
    fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding and return the placeholder
    fn add_binding(&mut self, value: SqlValue) -> &'static str {
        self.bindings.push(value);
        "?"
    }

    fn translate(&mut self, predicate: &StoragePredicate) -> String {
        match predicate {
            StoragePredicate::And(left, right) => {
                let left_sql = self.translate(left);
                let right_sql = self.translate(right);
                format!("({} AND {})", left_sql, right_sql)
            }
            StoragePredicate::Or(left, right) => {
                let left_sql = self.translate(left);
                let right_sql = self.translate(right);
                format!("({} OR {})", left_sql, right_sql)
            }
            StoragePredicate::Compare {
                column,
                op,
                value: PredicateValue::String(value),
                case_insensitive,
            } => self.translate_string_compare(column, *op, value, *case_insensitive),
            StoragePredicate::Compare {
                column,
                op,
                value: PredicateValue::Bool(value),
                ..
            } => self.translate_bool_compare(column, *op, *value),
            StoragePredicate::IsNull { column } => format!("{} IS NULL", column),
            StoragePredicate::IsNotNull { column } => format!("{} IS NOT NULL", column),
            StoragePredicate::Present { column, text: true } => {
                format!("({} IS NOT NULL AND {} != '')", column, column)
            }
            StoragePredicate::Present {
                column,
                text: false,
            } => format!("{} IS NOT NULL", column),
        }
    }

    fn translate_string_compare(
        &mut self,
        column: &str,
        op: ColumnOp,
        value: &str,
        case_insensitive: bool,
    ) -> String {
        let (sql_op, bound) = match op {
            ColumnOp::Equals => ("=", value.to_string()),
            ColumnOp::NotEquals => ("!=", value.to_string()),
            ColumnOp::Gt => (">", value.to_string()),
            ColumnOp::Gte => (">=", value.to_string()),
            ColumnOp::Lt => ("<", value.to_string()),
            ColumnOp::Lte => ("<=", value.to_string()),
            ColumnOp::Contains => ("LIKE", format!("%{}%", escape_like_pattern(value))),
            ColumnOp::StartsWith => ("LIKE", format!("{}%", escape_like_pattern(value))),
            ColumnOp::EndsWith => ("LIKE", format!("%{}", escape_like_pattern(value))),
        };
        let placeholder = self.add_binding(SqlValue::String(bound));
        let escape = if sql_op == "LIKE" { " ESCAPE '\\'" } else { "" };

        if case_insensitive {
            format!(
                "LOWER({}) {} LOWER({}){}",
                column, sql_op, placeholder, escape
            )
        } else {
            format!("{} {} {}{}", column, sql_op, placeholder, escape)
        }
    }

    fn translate_bool_compare(&mut self, column: &str, op: ColumnOp, value: bool) -> String {
        // ne true -> = false, so NULL rows stay excluded
        let value = match op {
            ColumnOp::NotEquals => !value,
            _ => value,
        };
        let placeholder = self.add_binding(SqlValue::Bool(value));
        format!("{} = {}", column, placeholder)
    }
}

/// Escape special characters in LIKE patterns.
/// Escapes: %, _, and \
fn escape_like_pattern(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            result.push('\\');
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scim::{columns::ColumnMap, pushdown::build_filter};

    fn translate_user(filter_str: &str) -> SqlFilter {
        build_filter(filter_str, ColumnMap::user())
            .expect("Failed to parse filter")
            .predicate
            .expect("Filter should push down")
            .to_sql()
    }

    #[test]
    fn test_simple_equality() {
        let result = translate_user(r#"userName eq "john""#);
        assert_eq!(result.where_clause, "LOWER(user_name) = LOWER(?)");
        assert_eq!(result.bindings, vec![SqlValue::String("john".to_string())]);
    }

    #[test]
    fn test_exact_text_equality() {
        let result = translate_user(r#"externalId eq "12-34""#);
        assert_eq!(result.where_clause, "external_id = ?");
        assert_eq!(result.bindings, vec![SqlValue::String("12-34".to_string())]);
    }

    #[test]
    fn test_boolean_comparisons() {
        let result = translate_user("active eq true");
        assert_eq!(result.where_clause, "active = ?");
        assert_eq!(result.bindings, vec![SqlValue::Bool(true)]);

        let result = translate_user("active ne true");
        assert_eq!(result.where_clause, "active = ?");
        assert_eq!(result.bindings, vec![SqlValue::Bool(false)]);
    }

    #[test]
    fn test_substring_operators() {
        let result = translate_user(r#"displayName co "oh""#);
        assert_eq!(
            result.where_clause,
            "LOWER(display_name) LIKE LOWER(?) ESCAPE '\\'"
        );
        assert_eq!(result.bindings, vec![SqlValue::String("%oh%".to_string())]);

        let result = translate_user(r#"displayName sw "jo""#);
        assert_eq!(result.bindings, vec![SqlValue::String("jo%".to_string())]);

        let result = translate_user(r#"displayName ew "hn""#);
        assert_eq!(result.bindings, vec![SqlValue::String("%hn".to_string())]);
    }

    #[test]
    fn test_like_escape() {
        let result = translate_user(r#"userName co "50%_off\\""#);
        assert_eq!(
            result.bindings,
            vec![SqlValue::String("%50\\%\\_off\\\\%".to_string())]
        );
    }

    #[test]
    fn test_ordering() {
        let result = translate_user(r#"id ge "m""#);
        assert_eq!(result.where_clause, "LOWER(id) >= LOWER(?)");
    }

    #[test]
    fn test_logical_operators_bind_in_order() {
        let result = translate_user(r#"userName eq "a" and (active eq false or displayName sw "b")"#);
        assert_eq!(
            result.where_clause,
            "(LOWER(user_name) = LOWER(?) AND (active = ? OR LOWER(display_name) LIKE LOWER(?) ESCAPE '\\'))"
        );
        assert_eq!(
            result.bindings,
            vec![
                SqlValue::String("a".to_string()),
                SqlValue::Bool(false),
                SqlValue::String("b%".to_string()),
            ]
        );
    }

    #[test]
    fn test_presence_and_null() {
        assert_eq!(
            translate_user("displayName pr").where_clause,
            "(display_name IS NOT NULL AND display_name != '')"
        );
        assert_eq!(translate_user("active pr").where_clause, "active IS NOT NULL");
        assert_eq!(
            translate_user("displayName eq null").where_clause,
            "display_name IS NULL"
        );
        let result = translate_user("displayName ne null");
        assert_eq!(result.where_clause, "display_name IS NOT NULL");
        assert!(result.bindings.is_empty());
    }

    #[test]
    fn test_qualified_column_names() {
        let columns = ColumnMap::new().with(
            "displayName",
            "m.display_name",
            crate::scim::columns::ValueClass::CaseInsensitiveText,
        );
        let result = build_filter(r#"displayName eq "Eng""#, &columns)
            .unwrap()
            .predicate
            .unwrap()
            .to_sql();
        assert_eq!(result.where_clause, "LOWER(m.display_name) = LOWER(?)");
    }

    #[test]
    fn test_escape_like_pattern() {
        assert_eq!(escape_like_pattern("hello"), "hello");
        assert_eq!(escape_like_pattern("100%"), "100\\%");
        assert_eq!(escape_like_pattern("a_b"), "a\\_b");
        assert_eq!(escape_like_pattern("c:\\dir"), "c:\\\\dir");
    }
}
