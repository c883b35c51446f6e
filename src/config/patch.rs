use serde::{Deserialize, Serialize};

use crate::scim::types::SCHEMA_ENTERPRISE_USER;

/// Behavior flags for PATCH application.
///
/// Passed by reference into every `apply_*_patch` call. The engines never
/// read configuration from anywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PatchConfig {
    /// Allow a single group operation to add (or remove by explicit value
    /// list) more than one member. Default: false.
    ///
    /// When false, such operations fail with `invalidValue` before any
    /// member is touched.
    #[serde(default)]
    pub allow_multi_member_add: bool,

    /// Allow `remove` on the bare `members` path with no value, which clears
    /// the member list. Default: true.
    #[serde(default = "default_true")]
    pub allow_remove_all_members: bool,

    /// Interpret dotted paths such as `name.givenName` as parent/child
    /// updates. When false, the dotted string is used verbatim as an
    /// attribute key. Default: false.
    #[serde(default)]
    pub verbose_dot_notation: bool,

    /// Schema URNs recognized as extension prefixes in PATCH paths.
    /// Default: the enterprise User extension.
    #[serde(default = "default_extension_schemas")]
    pub extension_schemas: Vec<String>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            allow_multi_member_add: false,
            allow_remove_all_members: default_true(),
            verbose_dot_notation: false,
            extension_schemas: default_extension_schemas(),
        }
    }
}

impl PatchConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        for urn in &self.extension_schemas {
            let is_urn = urn
                .get(..4)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"));
            if !is_urn || urn.ends_with(':') {
                return Err(format!(
                    "patch.extension_schemas entry '{}' is not a schema URN",
                    urn
                ));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_extension_schemas() -> Vec<String> {
    vec![SCHEMA_ENTERPRISE_USER.to_string()]
}
