//! Log-point message templates: `{expr}` holes inside a breakpoint's
//! `logMessage`, evaluated against the stopped frame and substituted in.
//!
//! Parsing only — evaluating the holes is the backend's job, via whatever
//! expression evaluator it already exposes for `evaluate` requests.

use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN_PATTERN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"\{\{|\}\}|\{[^{}]*\}"));

fn token_pattern() -> Option<&'static Regex> {
    TOKEN_PATTERN.as_ref().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogMessagePart {
    Literal(String),
    Expression(String),
}

/// Splits a `logMessage` template into literal and `{expr}` parts. `{{` and
/// `}}` escape to literal `{`/`}`.
#[must_use]
pub fn parse(template: &str) -> Vec<LogMessagePart> {
    let mut parts = Vec::new();
    let mut last_end = 0;

    let Some(pattern) = token_pattern() else {
        return vec![LogMessagePart::Literal(template.to_string())];
    };

    for m in pattern.find_iter(template) {
        if m.start() > last_end {
            parts.push(LogMessagePart::Literal(template[last_end..m.start()].to_string()));
        }

        let token = m.as_str();
        match token {
            "{{" => push_literal(&mut parts, "{"),
            "}}" => push_literal(&mut parts, "}"),
            _ => {
                let inner = &token[1..token.len() - 1];
                parts.push(LogMessagePart::Expression(inner.to_string()));
            }
        }

        last_end = m.end();
    }

    if last_end < template.len() {
        parts.push(LogMessagePart::Literal(template[last_end..].to_string()));
    }

    parts
}

fn push_literal(parts: &mut Vec<LogMessagePart>, text: &str) {
    if let Some(LogMessagePart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(LogMessagePart::Literal(text.to_string()));
    }
}

/// Renders `parts` to a final string, calling `evaluate` for each
/// `{expr}` hole and substituting its result. If `evaluate` fails for a
/// given expression, the hole renders as `<error: ...>` rather than
/// aborting the whole message.
pub fn render<F>(parts: &[LogMessagePart], mut evaluate: F) -> String
where
    F: FnMut(&str) -> Result<String, String>,
{
    let mut out = String::new();
    for part in parts {
        match part {
            LogMessagePart::Literal(text) => out.push_str(text),
            LogMessagePart::Expression(expr) => match evaluate(expr) {
                Ok(value) => out.push_str(&value),
                Err(err) => {
                    out.push_str("<error: ");
                    out.push_str(&err);
                    out.push('>');
                }
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literal_only_message() {
        assert_eq!(parse("hit the breakpoint"), vec![LogMessagePart::Literal("hit the breakpoint".to_string())]);
    }

    #[test]
    fn parses_single_expression_hole() {
        assert_eq!(
            parse("x is {x}"),
            vec![
                LogMessagePart::Literal("x is ".to_string()),
                LogMessagePart::Expression("x".to_string()),
            ]
        );
    }

    #[test]
    fn parses_multiple_holes() {
        let parts = parse("{a} plus {b} is {a + b}");
        assert_eq!(
            parts,
            vec![
                LogMessagePart::Expression("a".to_string()),
                LogMessagePart::Literal(" plus ".to_string()),
                LogMessagePart::Expression("b".to_string()),
                LogMessagePart::Literal(" is ".to_string()),
                LogMessagePart::Expression("a + b".to_string()),
            ]
        );
    }

    #[test]
    fn escaped_braces_are_literal() {
        assert_eq!(parse("{{literal braces}}"), vec![LogMessagePart::Literal("{literal braces}".to_string())]);
    }

    #[test]
    fn render_substitutes_evaluated_expressions() {
        let parts = parse("value: {x}");
        let rendered = render(&parts, |expr| {
            assert_eq!(expr, "x");
            Ok("42".to_string())
        });
        assert_eq!(rendered, "value: 42");
    }

    #[test]
    fn render_reports_evaluation_errors_inline() {
        let parts = parse("value: {bad}");
        let rendered = render(&parts, |_| Err("undefined variable".to_string()));
        assert_eq!(rendered, "value: <error: undefined variable>");
    }
}
