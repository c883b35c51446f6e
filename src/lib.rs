//! SCIM 2.0 filter, push-down and PATCH core.
//!
//! The crate does no I/O beyond loading its configuration file. Callers own
//! transport, storage and identity; this crate decides what a filter means,
//! whether their store can answer it natively, and what a PATCH request does
//! to a User or Group.

pub mod config;
pub mod scim;
