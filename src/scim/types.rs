//! SCIM 2.0 Schema URIs and Attribute Tables
//!
//! Canonical attribute names for the User and Group resources (RFC 7643
//! Sections 4.1 and 4.2), used to case-normalize PATCH paths and no-path
//! merge keys, plus the group member DTO shared by the Group engine.

use serde::{Deserialize, Serialize};

// =============================================================================
// Schema URIs
// =============================================================================

/// SCIM Core User schema URI
pub const SCHEMA_USER: &str = "urn:ietf:params:scim:schemas:core:2.0:User";

/// SCIM Core Group schema URI
pub const SCHEMA_GROUP: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";

/// SCIM Enterprise User extension schema URI
pub const SCHEMA_ENTERPRISE_USER: &str =
    "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";

/// SCIM Error schema URI
pub const SCHEMA_ERROR: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

// =============================================================================
// Attribute Tables
// =============================================================================

/// Canonical User attribute names (RFC 7643 Section 4.1).
pub const USER_ATTRIBUTES: &[&str] = &[
    "id",
    "externalId",
    "meta",
    "schemas",
    "userName",
    "name",
    "displayName",
    "nickName",
    "profileUrl",
    "title",
    "userType",
    "preferredLanguage",
    "locale",
    "timezone",
    "active",
    "password",
    "emails",
    "phoneNumbers",
    "ims",
    "photos",
    "addresses",
    "groups",
    "entitlements",
    "roles",
    "x509Certificates",
];

/// Canonical Group attribute names (RFC 7643 Section 4.2).
pub const GROUP_ATTRIBUTES: &[&str] = &[
    "id",
    "externalId",
    "meta",
    "schemas",
    "displayName",
    "members",
];

/// Keys never kept in a User's free-form payload. They live solely in the
/// extracted first-class fields (or are server-assigned).
pub const USER_SERVER_MANAGED: &[&str] = &["id", "userName", "externalId", "active"];

/// Keys never kept in a Group's free-form payload.
pub const GROUP_SERVER_MANAGED: &[&str] = &["id", "displayName", "externalId", "members", "schemas"];

/// Look up the canonical spelling of `name` in `table`, ignoring ASCII case.
pub fn canonical_attribute<'a>(table: &[&'a str], name: &str) -> Option<&'a str> {
    table
        .iter()
        .copied()
        .find(|candidate| candidate.eq_ignore_ascii_case(name))
}

// =============================================================================
// Group Member
// =============================================================================

/// A member of a SCIM Group.
///
/// Identity is `value`: after any Group engine operation no two members
/// share a `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct GroupMember {
    /// Member resource ID
    pub value: String,

    /// Human-readable name of the member
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// Member type ("User" or "Group")
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub member_type: Option<String>,
}

impl GroupMember {
    /// Create a member with just an ID
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            display: None,
            member_type: None,
        }
    }

    /// Set the display name
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Set the member type
    pub fn with_type(mut self, member_type: impl Into<String>) -> Self {
        self.member_type = Some(member_type.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_canonical_attribute_case_insensitive() {
        assert_eq!(
            canonical_attribute(USER_ATTRIBUTES, "USERNAME"),
            Some("userName")
        );
        assert_eq!(
            canonical_attribute(USER_ATTRIBUTES, "phonenumbers"),
            Some("phoneNumbers")
        );
        assert_eq!(canonical_attribute(USER_ATTRIBUTES, "members"), None);
        assert_eq!(
            canonical_attribute(GROUP_ATTRIBUTES, "Members"),
            Some("members")
        );
    }

    #[test]
    fn test_group_member_serialization() {
        let member = GroupMember::new("user-1")
            .with_display("Jane")
            .with_type("User");
        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(
            json,
            json!({"value": "user-1", "display": "Jane", "type": "User"})
        );

        let bare = serde_json::to_value(GroupMember::new("user-2")).unwrap();
        assert_eq!(bare, json!({"value": "user-2"}));
    }
}
