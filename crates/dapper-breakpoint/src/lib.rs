//! Breakpoint bookkeeping for the Dapper debug adapter.
//!
//! This crate owns *identity and replace semantics* for breakpoints, not
//! validation of whether a given line is executable — that judgment belongs
//! to the backend, which reports `verified`/adjusted lines back through
//! [`BreakpointStore::apply_verification`].
//!
//! # Overview
//!
//! - [`BreakpointStore`] - source breakpoints keyed by `(path, line)`, REPLACE
//!   semantics per `setBreakpoints` call, with id stability across
//!   replacements when `(condition, hit_condition, log_message)` is unchanged
//! - [`FunctionBreakpointStore`] - the analogous store keyed by function name
//! - [`ExceptionFilterState`] - tracks the active exception breakpoint filters

mod store;

pub use store::{
    BreakpointRecord, BreakpointSpec, BreakpointStore, ExceptionFilterState, FunctionBreakpointRecord,
    FunctionBreakpointSpec, FunctionBreakpointStore,
};

/// Error type for breakpoint bookkeeping operations.
#[derive(Debug, thiserror::Error)]
pub enum BreakpointError {
    #[error("unknown breakpoint id {0}")]
    UnknownId(i64),

    #[error("source path must be non-empty")]
    EmptyPath,
}
