//! Structural evaluate/setExpression safety guard for the Dapper debug
//! adapter.
//!
//! This crate does not understand any particular debuggee language. It
//! rejects expressions on purely structural grounds before they ever reach a
//! backend: multi-line input (DAP expressions are single-line), shell
//! backtick execution, and — when the evaluation context forbids side
//! effects — assignment-shaped or increment/decrement-shaped text.
//!
//! Anything structurally safe is still the backend's responsibility to
//! evaluate; this guard only narrows what is allowed to be *attempted*.
//!
//! # Example
//!
//! ```rust
//! use dapper_eval::{EvaluationContext, EvaluationGuard};
//!
//! let guard = EvaluationGuard::new();
//! assert!(guard.validate("x + y", EvaluationContext::Hover, false).is_ok());
//! assert!(guard.validate("x = 1", EvaluationContext::Hover, false).is_err());
//! assert!(guard.validate("x = 1", EvaluationContext::Repl, true).is_ok());
//! ```

mod validator;

pub use validator::{EvaluationContext, EvaluationGuard, ValidationError};
