//! Configuration for the SCIM query and PATCH core.
//!
//! The core is configured via a TOML document, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax. Every section is
//! optional; an empty document yields the defaults.
//!
//! # Example
//!
//! ```toml
//! [filter]
//! max_length = 4096
//! max_depth = 32
//!
//! [patch]
//! allow_multi_member_add = true
//! allow_remove_all_members = false
//! verbose_dot_notation = ${SCIM_VERBOSE_PATCH}
//! ```

mod filter;
mod patch;

use std::path::Path;

pub use filter::*;
use once_cell::sync::Lazy;
pub use patch::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Root configuration for the SCIM core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct ScimCoreConfig {
    /// Limits applied when parsing filter expressions.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Behavior flags for PATCH application.
    #[serde(default)]
    pub patch: PatchConfig,
}

impl ScimCoreConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: ScimCoreConfig = toml::from_str(&expanded)?;
        config.validate()?;

        tracing::debug!(
            max_filter_length = config.filter.max_length,
            max_filter_depth = config.filter.max_depth,
            allow_multi_member_add = config.patch.allow_multi_member_add,
            allow_remove_all_members = config.patch.allow_remove_all_members,
            verbose_dot_notation = config.patch.verbose_dot_notation,
            "Loaded SCIM core configuration"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency.
    fn validate(&self) -> Result<(), ConfigError> {
        self.filter.validate().map_err(ConfigError::Validation)?;
        self.patch.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }

    /// Generate the JSON schema for the configuration.
    #[cfg(feature = "json-schema")]
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ScimCoreConfig)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex"));

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips variables that appear after a `#` comment marker on the same line.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR_PATTERN.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ScimCoreConfig::from_str("").unwrap();

        assert_eq!(config.filter.max_length, DEFAULT_MAX_FILTER_LENGTH);
        assert_eq!(config.filter.max_depth, DEFAULT_MAX_FILTER_DEPTH);
        assert!(!config.patch.allow_multi_member_add);
        assert!(config.patch.allow_remove_all_members);
        assert!(!config.patch.verbose_dot_notation);
        assert_eq!(config.patch.extension_schemas.len(), 1);
    }

    #[test]
    fn test_full_config() {
        let config = ScimCoreConfig::from_str(
            r#"
            [filter]
            max_length = 1024
            max_depth = 8

            [patch]
            allow_multi_member_add = true
            allow_remove_all_members = false
            verbose_dot_notation = true
            extension_schemas = ["urn:example:params:scim:schemas:extension:custom:2.0:User"]
        "#,
        )
        .unwrap();

        assert_eq!(config.filter.max_length, 1024);
        assert_eq!(config.filter.max_depth, 8);
        assert!(config.patch.allow_multi_member_add);
        assert!(!config.patch.allow_remove_all_members);
        assert!(config.patch.verbose_dot_notation);
        assert_eq!(
            config.patch.extension_schemas,
            vec!["urn:example:params:scim:schemas:extension:custom:2.0:User".to_string()]
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ScimCoreConfig::from_str(
            r#"
            [patch]
            allow_everything = true
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validation_rejects_zero_depth() {
        let result = ScimCoreConfig::from_str(
            r#"
            [filter]
            max_depth = 0
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_rejects_non_urn_extension() {
        let result = ScimCoreConfig::from_str(
            r#"
            [patch]
            extension_schemas = ["enterprise"]
        "#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("enterprise"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[patch]\nallow_multi_member_add = true").unwrap();

        let config = ScimCoreConfig::from_file(file.path()).unwrap();
        assert!(config.patch.allow_multi_member_add);
    }

    #[test]
    fn test_from_missing_file() {
        let result = ScimCoreConfig::from_file("/nonexistent/scim-core.toml");
        assert!(matches!(result, Err(ConfigError::Io(_, _))));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("SCIM_TEST_MULTI_ADD", Some("true"), || {
            let config = ScimCoreConfig::from_str(
                "[patch]\nallow_multi_member_add = ${SCIM_TEST_MULTI_ADD}",
            )
            .unwrap();
            assert!(config.patch.allow_multi_member_add);
        });
    }

    #[test]
    fn test_env_var_missing() {
        temp_env::with_var_unset("SCIM_TEST_UNSET_VAR", || {
            let result = expand_env_vars("key = \"${SCIM_TEST_UNSET_VAR}\"");
            assert!(matches!(result, Err(ConfigError::EnvVarNotFound(v)) if v == "SCIM_TEST_UNSET_VAR"));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# max_depth = ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "# max_depth = ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_env_var_before_comment_expanded() {
        temp_env::with_var("SCIM_TEST_BEFORE_COMMENT", Some("16"), || {
            let result =
                expand_env_vars("max_depth = ${SCIM_TEST_BEFORE_COMMENT} # comment here").unwrap();
            assert_eq!(result, "max_depth = 16 # comment here");
        });
    }
}
