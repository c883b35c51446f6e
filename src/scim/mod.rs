//! SCIM 2.0 query and PATCH core
//!
//! Everything a SCIM service needs between the wire and the store, with no
//! I/O of its own: filters are parsed, evaluated against JSON records, and
//! (when the mapped columns allow it) planned into storage predicates; PATCH
//! requests are resolved and folded over User and Group state.
//!
//! ## RFC References
//!
//! - RFC 7643: SCIM Core Schema
//! - RFC 7644: SCIM Protocol
//!
//! ## Module Structure
//!
//! - [`filter`]: filter expression parser and AST
//! - [`evaluate`]: in-memory filter evaluation over JSON records
//! - [`columns`]: attribute to storage column mapping
//! - [`pushdown`]: all-or-nothing push-down planner
//! - [`sql`]: SQL rendering of storage predicates
//! - [`path`]: PATCH path resolution
//! - [`patch`]: PATCH operations and shared payload helpers
//! - [`user_patch`]: PATCH engine for Users
//! - [`group_patch`]: PATCH engine for Groups
//! - [`types`]: schema URNs, attribute tables, members
//! - [`error`]: SCIM error responses per RFC 7644

pub mod columns;
pub mod error;
pub mod evaluate;
pub mod filter;
pub mod group_patch;
pub mod patch;
pub mod path;
pub mod pushdown;
pub mod sql;
pub mod types;
pub mod user_patch;

pub use columns::{ColumnMap, ColumnSpec, ScimResourceType, ValueClass};
pub use error::*;
pub use evaluate::evaluate;
pub use filter::{
    CompareOp, Filter, FilterParseError, FilterValue, LogicalOp, parse_filter, parse_filter_with,
};
pub use group_patch::{GroupPatchState, apply_group_patch};
pub use patch::{PatchError, PatchOpKind, PatchOperation};
pub use path::{PatchPath, resolve_path};
pub use pushdown::{
    ColumnOp, PredicateValue, PushDown, QueryPlan, StoragePredicate, UnpushableReason,
    build_filter, build_filter_with, plan,
};
pub use sql::{SqlFilter, SqlValue};
pub use types::*;
pub use user_patch::{UserPatchState, apply_user_patch};
