//! SCIM 2.0 Filter Parser
//!
//! This module implements a parser for SCIM filter expressions per RFC 7644 Section 3.4.2.
//!
//! ## Grammar (simplified)
//!
//! ```text
//! filter        = orExpr
//! orExpr        = andExpr { "or" andExpr }
//! andExpr       = primary { "and" primary }
//! primary       = "not" "(" filter ")" | "(" filter ")" | valuePathExpr | compareExpr
//! valuePathExpr = attrPath "[" filter "]" [ "." subAttr compareOp [compValue] ]
//! compareExpr   = attrPath compareOp [compValue]
//! compareOp     = "eq" | "ne" | "co" | "sw" | "ew" | "gt" | "ge" | "lt" | "le" | "pr"
//! compValue     = "true" | "false" | "null" | NUMBER | STRING
//! ```
//!
//! `pr` takes no value; every other operator takes exactly one. Attribute
//! paths are kept as opaque strings (`name.familyName`,
//! `urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:employeeNumber`);
//! consumers interpret them.
//!
//! A value path followed by a sub-attribute comparison, such as
//! `emails[type eq "work"].value eq "john@example.com"`, is parsed as a value
//! path whose element filter is `type eq "work" and value eq "john@example.com"`.
//!
//! ## Security Limits
//!
//! To prevent DoS attacks from malicious filter expressions the parser
//! enforces [`FilterConfig::max_length`] and [`FilterConfig::max_depth`]
//! (4096 bytes and 32 levels by default).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;

/// A parsed SCIM filter expression.
///
/// Immutable once parsed; every consumer matches on all four variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Attribute comparison (e.g., `userName eq "john"`, `title pr`).
    ///
    /// `value` is `None` exactly when `op` is [`CompareOp::Pr`].
    Compare {
        attr: String,
        op: CompareOp,
        value: Option<FilterValue>,
    },
    /// Logical AND / OR of two filters
    Logical {
        op: LogicalOp,
        left: Box<Filter>,
        right: Box<Filter>,
    },
    /// Logical NOT of a filter
    Not(Box<Filter>),
    /// Element-scoped filter over a multi-valued attribute (e.g., `emails[type eq "work"]`)
    ValuePath { attr: String, filter: Box<Filter> },
}

impl Filter {
    /// Build a comparison node.
    pub fn compare(attr: impl Into<String>, op: CompareOp, value: FilterValue) -> Self {
        Filter::Compare {
            attr: attr.into(),
            op,
            value: Some(value),
        }
    }

    /// Build a presence (`pr`) node.
    pub fn present(attr: impl Into<String>) -> Self {
        Filter::Compare {
            attr: attr.into(),
            op: CompareOp::Pr,
            value: None,
        }
    }

    /// Combine two filters with `and`.
    pub fn and(left: Filter, right: Filter) -> Self {
        Filter::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Combine two filters with `or`.
    pub fn or(left: Filter, right: Filter) -> Self {
        Filter::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Negate a filter.
    pub fn negate(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }

    /// Build a value-path node.
    pub fn value_path(attr: impl Into<String>, filter: Filter) -> Self {
        Filter::ValuePath {
            attr: attr.into(),
            filter: Box::new(filter),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare {
                attr,
                op,
                value: Some(value),
            } => write!(f, "{} {} {}", attr, op, value),
            Filter::Compare {
                attr,
                op,
                value: None,
            } => write!(f, "{} {}", attr, op),
            Filter::Logical { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Filter::Not(inner) => write!(f, "not ({})", inner),
            Filter::ValuePath { attr, filter } => write!(f, "{}[{}]", attr, filter),
        }
    }
}

/// Comparison operators per RFC 7644.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Contains
    Co,
    /// Starts with
    Sw,
    /// Ends with
    Ew,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
    /// Present (has a value)
    Pr,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Co => "co",
            CompareOp::Sw => "sw",
            CompareOp::Ew => "ew",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
            CompareOp::Pr => "pr",
        };
        write!(f, "{}", s)
    }
}

impl CompareOp {
    /// Parse an operator keyword, ignoring ASCII case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "co" => Some(CompareOp::Co),
            "sw" => Some(CompareOp::Sw),
            "ew" => Some(CompareOp::Ew),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            "pr" => Some(CompareOp::Pr),
            _ => None,
        }
    }

    /// Whether this is one of the substring operators `co`, `sw`, `ew`.
    pub fn is_substring(self) -> bool {
        matches!(self, CompareOp::Co | CompareOp::Sw | CompareOp::Ew)
    }

    /// Whether this is one of the ordering operators `gt`, `ge`, `lt`, `le`.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le
        )
    }
}

/// Logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "and"),
            LogicalOp::Or => write!(f, "or"),
        }
    }
}

/// Filter comparison values.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Bool(bool),
    Number(f64),
    Null,
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::String(s) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Null => write!(f, "null"),
        }
    }
}

/// Filter parsing error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct FilterParseError {
    pub message: String,
    pub position: usize,
}

impl FilterParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

/// Parse a SCIM filter expression with the default limits.
///
/// # Errors
///
/// Returns an error if:
/// - The filter exceeds the maximum length or nesting depth
/// - Brackets, parentheses or quotes are unbalanced
/// - An operator token is unknown or a value is missing
/// - An attribute path is empty
///
/// # Examples
///
/// ```
/// use scim_core::scim::filter::parse_filter;
///
/// let filter = parse_filter("userName eq \"john\"").unwrap();
/// let filter = parse_filter("active eq true and emails[type eq \"work\"]").unwrap();
/// ```
pub fn parse_filter(input: &str) -> Result<Filter, FilterParseError> {
    parse_filter_with(input, &FilterConfig::default())
}

/// Parse a SCIM filter expression with explicit limits.
pub fn parse_filter_with(input: &str, limits: &FilterConfig) -> Result<Filter, FilterParseError> {
    if input.len() > limits.max_length {
        return Err(FilterParseError::new(
            format!(
                "Filter exceeds maximum length ({} bytes, max {})",
                input.len(),
                limits.max_length
            ),
            0,
        ));
    }

    let mut parser = Parser::new(input, limits.max_depth);
    let filter = parser.parse_filter()?;

    parser.skip_whitespace();
    if parser.position < parser.input.len() {
        return Err(FilterParseError::new(
            format!("Unexpected input: '{}'", &parser.input[parser.position..]),
            parser.position,
        ));
    }

    Ok(filter)
}

// =============================================================================
// Parser Implementation
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    position: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, max_depth: usize) -> Self {
        Self {
            input,
            position: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Enter a nested scope (parentheses, brackets, etc.).
    fn enter_scope(&mut self) -> Result<(), FilterParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FilterParseError::new(
                format!(
                    "Filter exceeds maximum nesting depth ({})",
                    self.max_depth
                ),
                self.position,
            ));
        }
        Ok(())
    }

    fn exit_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterParseError> {
        self.parse_or_expr()
    }

    // orExpr = andExpr { "or" andExpr }
    fn parse_or_expr(&mut self) -> Result<Filter, FilterParseError> {
        let mut left = self.parse_and_expr()?;

        while self.try_keyword("or") {
            let right = self.parse_and_expr()?;
            left = Filter::or(left, right);
        }

        Ok(left)
    }

    // andExpr = primary { "and" primary }
    fn parse_and_expr(&mut self) -> Result<Filter, FilterParseError> {
        let mut left = self.parse_primary()?;

        while self.try_keyword("and") {
            let right = self.parse_primary()?;
            left = Filter::and(left, right);
        }

        Ok(left)
    }

    // primary = "not" "(" filter ")" | "(" filter ")" | valuePathExpr | compareExpr
    fn parse_primary(&mut self) -> Result<Filter, FilterParseError> {
        self.skip_whitespace();

        if self.try_keyword("not") {
            self.skip_whitespace();
            if !self.try_char('(') {
                return Err(FilterParseError::new(
                    "Expected '(' after 'not'",
                    self.position,
                ));
            }
            let inner = self.parse_nested(')', "Expected ')' to close 'not' expression")?;
            return Ok(Filter::negate(inner));
        }

        if self.try_char('(') {
            return self.parse_nested(')', "Expected ')' to close grouped expression");
        }

        self.parse_attr_expr()
    }

    /// Parse a nested filter after its opening delimiter, through `close`.
    fn parse_nested(&mut self, close: char, message: &str) -> Result<Filter, FilterParseError> {
        self.enter_scope()?;
        let inner = self.parse_filter()?;
        self.exit_scope();
        self.skip_whitespace();
        if !self.try_char(close) {
            return Err(FilterParseError::new(message, self.position));
        }
        Ok(inner)
    }

    // valuePathExpr | compareExpr
    fn parse_attr_expr(&mut self) -> Result<Filter, FilterParseError> {
        let attr = self.parse_attr_path()?;

        if self.try_char('[') {
            let element_filter = self.parse_nested(']', "Expected ']' to close value filter")?;

            // emails[type eq "work"].value eq "x" -> emails[type eq "work" and value eq "x"]
            let element_filter = if self.try_char('.') {
                let sub_attr = self.parse_attr_path()?;
                let comparison = self.parse_comparison(sub_attr)?;
                Filter::and(element_filter, comparison)
            } else {
                element_filter
            };

            return Ok(Filter::value_path(attr, element_filter));
        }

        self.parse_comparison(attr)
    }

    // compareOp [compValue]
    fn parse_comparison(&mut self, attr: String) -> Result<Filter, FilterParseError> {
        let op = self.parse_compare_op()?;

        if op == CompareOp::Pr {
            return Ok(Filter::Compare {
                attr,
                op,
                value: None,
            });
        }

        let value = self.parse_value()?;
        Ok(Filter::Compare {
            attr,
            op,
            value: Some(value),
        })
    }

    /// Parse an opaque attribute path: a name optionally carrying `.` segments
    /// or a `urn:...:` prefix.
    fn parse_attr_path(&mut self) -> Result<String, FilterParseError> {
        self.skip_whitespace();

        let start = self.position;

        // Attribute names must start with a letter
        if !self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            return Err(FilterParseError::new("Expected attribute name", start));
        }

        while self.peek().is_some_and(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '$')
        }) {
            self.advance();
        }

        let path = &self.input[start..self.position];

        if path.ends_with('.') || path.ends_with(':') || path.contains("..") {
            return Err(FilterParseError::new(
                format!("Empty attribute name in path '{}'", path),
                start,
            ));
        }

        Ok(path.to_string())
    }

    fn parse_compare_op(&mut self) -> Result<CompareOp, FilterParseError> {
        self.skip_whitespace();

        let start = self.position;

        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }

        let op_str = &self.input[start..self.position];

        if op_str.is_empty() {
            return Err(FilterParseError::new("Expected comparison operator", start));
        }

        CompareOp::parse(op_str)
            .ok_or_else(|| FilterParseError::new(format!("Unknown operator: '{}'", op_str), start))
    }

    fn parse_value(&mut self) -> Result<FilterValue, FilterParseError> {
        self.skip_whitespace();

        if self.peek() == Some('"') {
            return self.parse_string_value();
        }

        if self.try_keyword("true") {
            return Ok(FilterValue::Bool(true));
        }
        if self.try_keyword("false") {
            return Ok(FilterValue::Bool(false));
        }
        if self.try_keyword("null") {
            return Ok(FilterValue::Null);
        }

        if self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            return self.parse_number_value();
        }

        Err(FilterParseError::new(
            "Expected value (string, boolean, number, or null)",
            self.position,
        ))
    }

    fn parse_string_value(&mut self) -> Result<FilterValue, FilterParseError> {
        if !self.try_char('"') {
            return Err(FilterParseError::new(
                "Expected '\"' to start string",
                self.position,
            ));
        }

        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(FilterParseError::new("Unterminated string", self.position));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    let escaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        _ => {
                            return Err(FilterParseError::new(
                                "Invalid escape sequence",
                                self.position,
                            ));
                        }
                    };
                    value.push(escaped);
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(FilterValue::String(value))
    }

    fn parse_number_value(&mut self) -> Result<FilterValue, FilterParseError> {
        let start = self.position;

        if self.peek() == Some('-') || self.peek() == Some('+') {
            self.advance();
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek() == Some('-') || self.peek() == Some('+') {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.position];
        match num_str.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(FilterValue::Number(n)),
            _ => Err(FilterParseError::new(
                format!("Invalid number: '{}'", num_str),
                start,
            )),
        }
    }

    // Helper methods

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn try_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();

        let remaining = &self.input[self.position..];

        if remaining
            .get(..keyword.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
        {
            // Make sure keyword is not part of a larger identifier
            let after_keyword = remaining[keyword.len()..].chars().next();
            if after_keyword.is_none_or(|c| !c.is_ascii_alphanumeric()) {
                self.position += keyword.len();
                return true;
            }
        }

        false
    }
}

// =============================================================================
// Tests
// =============================================================================
