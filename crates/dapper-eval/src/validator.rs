//! Structural validation for `evaluate`/`setExpression` input.

/// Where an expression is being evaluated from, per the DAP `context` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationContext {
    Watch,
    Repl,
    Hover,
    Clipboard,
}

impl EvaluationContext {
    /// Side effects are only assumed safe in a REPL; hover/watch/clipboard
    /// evaluations can fire without explicit user intent (e.g. on every
    /// cursor move), so mutation-shaped expressions are rejected there
    /// unless the request explicitly sets `allowSideEffects`.
    fn side_effects_assumed_ok(self) -> bool {
        matches!(self, EvaluationContext::Repl)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("expression must be a single line")]
    ContainsNewlines,

    #[error("backtick shell execution is not allowed")]
    Backticks,

    #[error("assignment is not allowed in this evaluation context")]
    AssignmentNotAllowed,

    #[error("increment/decrement is not allowed in this evaluation context")]
    IncrementDecrementNotAllowed,
}

/// Structural guard applied before an expression is handed to a backend.
#[derive(Debug, Default)]
pub struct EvaluationGuard;

impl EvaluationGuard {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validates `expr` for the given context. `allow_side_effects` mirrors
    /// the `EvaluateArguments.allowSideEffects` field and overrides the
    /// context's default policy when explicitly set.
    pub fn validate(
        &self,
        expr: &str,
        context: EvaluationContext,
        allow_side_effects: bool,
    ) -> Result<(), ValidationError> {
        if expr.contains('\n') || expr.contains('\r') {
            return Err(ValidationError::ContainsNewlines);
        }

        if expr.contains('`') {
            return Err(ValidationError::Backticks);
        }

        let side_effects_ok = allow_side_effects || context.side_effects_assumed_ok();
        if !side_effects_ok {
            if has_increment_decrement(expr) {
                return Err(ValidationError::IncrementDecrementNotAllowed);
            }
            if has_assignment(expr) {
                return Err(ValidationError::AssignmentNotAllowed);
            }
        }

        Ok(())
    }
}

fn has_increment_decrement(expr: &str) -> bool {
    expr.contains("++") || expr.contains("--")
}

/// Detects a bare `=` that is not part of a comparison/compound-assignment
/// or other multi-character operator (`==`, `!=`, `<=`, `>=`, `=>`, `+=` etc.)
fn has_assignment(expr: &str) -> bool {
    let bytes = expr.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'=' {
            continue;
        }
        let prev = if i > 0 { Some(bytes[i - 1]) } else { None };
        let next = bytes.get(i + 1).copied();

        if next == Some(b'=') {
            continue; // `==`
        }
        if matches!(prev, Some(b'=' | b'!' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'%' | b'&' | b'|' | b'^'))
        {
            continue; // compound assignment or comparison
        }
        if next == Some(b'>') {
            continue; // `=>` fat arrow / lambda arrow
        }
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_plain_expressions() {
        let guard = EvaluationGuard::new();
        assert!(guard.validate("x + y", EvaluationContext::Hover, false).is_ok());
        assert!(guard.validate("items[0]", EvaluationContext::Watch, false).is_ok());
    }

    #[test]
    fn allows_comparisons_without_side_effects() {
        let guard = EvaluationGuard::new();
        assert!(guard.validate("x == y", EvaluationContext::Hover, false).is_ok());
        assert!(guard.validate("x >= 1 && y <= 2", EvaluationContext::Hover, false).is_ok());
        assert!(guard.validate("key => value", EvaluationContext::Hover, false).is_ok());
    }

    #[test]
    fn rejects_newlines() {
        let guard = EvaluationGuard::new();
        assert_eq!(
            guard.validate("x\ny", EvaluationContext::Repl, true).unwrap_err(),
            ValidationError::ContainsNewlines
        );
    }

    #[test]
    fn rejects_backticks_even_in_repl() {
        let guard = EvaluationGuard::new();
        assert_eq!(
            guard.validate("`rm -rf /`", EvaluationContext::Repl, true).unwrap_err(),
            ValidationError::Backticks
        );
    }

    #[test]
    fn rejects_assignment_in_hover_without_opt_in() {
        let guard = EvaluationGuard::new();
        assert_eq!(
            guard.validate("x = 1", EvaluationContext::Hover, false).unwrap_err(),
            ValidationError::AssignmentNotAllowed
        );
    }

    #[test]
    fn allows_assignment_in_repl_by_default() {
        let guard = EvaluationGuard::new();
        assert!(guard.validate("x = 1", EvaluationContext::Repl, false).is_ok());
    }

    #[test]
    fn allows_assignment_when_explicitly_opted_in() {
        let guard = EvaluationGuard::new();
        assert!(guard.validate("x = 1", EvaluationContext::Watch, true).is_ok());
    }

    #[test]
    fn rejects_increment_decrement_without_opt_in() {
        let guard = EvaluationGuard::new();
        assert_eq!(
            guard.validate("x++", EvaluationContext::Clipboard, false).unwrap_err(),
            ValidationError::IncrementDecrementNotAllowed
        );
    }
}
