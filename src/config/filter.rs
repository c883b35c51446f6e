use serde::{Deserialize, Serialize};

/// Default maximum length of a filter expression (bytes).
///
/// 4KB is generous for any real-world SCIM filter while bounding parse cost.
pub const DEFAULT_MAX_FILTER_LENGTH: usize = 4096;

/// Default maximum nesting depth of a filter expression.
///
/// Bounds recursion for inputs like `not (not (not (...)))` or `a[b[c[...]]]`.
pub const DEFAULT_MAX_FILTER_DEPTH: usize = 32;

/// Limits applied when parsing SCIM filter expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Maximum filter length in bytes. Default: 4096.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Maximum nesting depth across parentheses, `not (...)` and `[...]`.
    /// Default: 32.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            max_depth: default_max_depth(),
        }
    }
}

impl FilterConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_length == 0 {
            return Err("filter.max_length must be greater than 0".into());
        }
        if self.max_depth == 0 {
            return Err("filter.max_depth must be greater than 0".into());
        }
        Ok(())
    }
}

fn default_max_length() -> usize {
    DEFAULT_MAX_FILTER_LENGTH
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_FILTER_DEPTH
}
