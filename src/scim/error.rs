//! SCIM 2.0 Error Types
//!
//! Error responses per RFC 7644 Section 3.12. Filter and PATCH failures
//! convert into [`ScimErrorResponse`] so a transport layer can serialize
//! them directly with the matching HTTP status.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use super::{filter::FilterParseError, patch::PatchError, types::SCHEMA_ERROR};

/// SCIM error response per RFC 7644.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ScimErrorResponse {
    /// SCIM schema URIs (always contains the Error schema)
    pub schemas: Vec<String>,

    /// HTTP status code as a string (e.g., "400")
    pub status: String,

    /// SCIM-specific error type (optional, per RFC 7644)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<ScimErrorType>,

    /// Human-readable error detail
    pub detail: String,
}

impl ScimErrorResponse {
    fn new(
        status: StatusCode,
        scim_type: Option<ScimErrorType>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            schemas: vec![SCHEMA_ERROR.to_string()],
            status: status.as_u16().to_string(),
            scim_type,
            detail: detail.into(),
        }
    }

    /// Invalid filter syntax error (400)
    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidFilter),
            detail,
        )
    }

    /// Malformed or unsupported PATCH path (400)
    pub fn invalid_path(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidPath),
            detail,
        )
    }

    /// PATCH target missing or matched nothing (400)
    pub fn no_target(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::NoTarget),
            detail,
        )
    }

    /// Invalid attribute value (400)
    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidValue),
            detail,
        )
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status.parse().unwrap_or(500))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<FilterParseError> for ScimErrorResponse {
    fn from(err: FilterParseError) -> Self {
        Self::invalid_filter(err.to_string())
    }
}

impl From<PatchError> for ScimErrorResponse {
    fn from(err: PatchError) -> Self {
        Self::new(err.status_code(), Some(err.scim_type()), err.to_string())
    }
}

/// SCIM error types per RFC 7644 Section 3.12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub enum ScimErrorType {
    /// Filter syntax is invalid or unsupported
    InvalidFilter,

    /// PATCH path is malformed or unsupported
    InvalidPath,

    /// PATCH operation missing required path or matched nothing
    NoTarget,

    /// Attribute value is invalid for its type
    InvalidValue,
}

impl std::fmt::Display for ScimErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScimErrorType::InvalidFilter => write!(f, "invalidFilter"),
            ScimErrorType::InvalidPath => write!(f, "invalidPath"),
            ScimErrorType::NoTarget => write!(f, "noTarget"),
            ScimErrorType::InvalidValue => write!(f, "invalidValue"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scim::filter::parse_filter;

    #[test]
    fn test_scim_error_invalid_filter() {
        let err = ScimErrorResponse::invalid_filter("The filter syntax is invalid");

        assert_eq!(err.status, "400");
        assert_eq!(err.scim_type, Some(ScimErrorType::InvalidFilter));

        let json = serde_json::to_string_pretty(&err).unwrap();
        assert!(json.contains("\"scimType\": \"invalidFilter\""));
        assert!(json.contains("\"status\": \"400\""));
        assert!(json.contains(SCHEMA_ERROR));
    }

    #[test]
    fn test_scim_type_optional_on_the_wire() {
        let err: ScimErrorResponse = serde_json::from_value(serde_json::json!({
            "schemas": [SCHEMA_ERROR],
            "status": "404",
            "detail": "Resource not found"
        }))
        .unwrap();
        assert_eq!(err.scim_type, None);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("scimType"));
    }

    #[test]
    fn test_from_filter_parse_error() {
        let parse_err = parse_filter("userName xx \"a\"").unwrap_err();
        let err = ScimErrorResponse::from(parse_err);

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.scim_type, Some(ScimErrorType::InvalidFilter));
        assert!(err.detail.contains("Unknown operator"));
    }

    #[test]
    fn test_from_patch_error() {
        let cases = [
            (
                PatchError::InvalidPath("bad".into()),
                ScimErrorType::InvalidPath,
            ),
            (
                PatchError::InvalidValue("bad".into()),
                ScimErrorType::InvalidValue,
            ),
            (PatchError::NoTarget("bad".into()), ScimErrorType::NoTarget),
        ];

        for (patch_err, expected) in cases {
            let err = ScimErrorResponse::from(patch_err);
            assert_eq!(err.status, "400");
            assert_eq!(err.scim_type, Some(expected));
        }
    }

    #[test]
    fn test_scim_error_type_display() {
        assert_eq!(format!("{}", ScimErrorType::InvalidFilter), "invalidFilter");
        assert_eq!(format!("{}", ScimErrorType::InvalidPath), "invalidPath");
        assert_eq!(format!("{}", ScimErrorType::NoTarget), "noTarget");
    }
}
