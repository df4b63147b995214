//! Renders [`Value`] trees into DAP-compatible [`RenderedVariable`]s.

use crate::Value;
use serde::{Deserialize, Serialize};

/// A rendered variable for the DAP protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedVariable {
    pub name: String,

    pub value: String,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,

    /// 0 means not expandable.
    pub variables_reference: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_variables: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexed_variables: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<VariablePresentationHint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_reference: Option<String>,
}

/// Presentation hints for variable display in the DAP UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablePresentationHint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
}

impl RenderedVariable {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            type_name: None,
            variables_reference: 0,
            named_variables: None,
            indexed_variables: None,
            presentation_hint: None,
            memory_reference: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    #[must_use]
    pub fn with_reference(mut self, reference: i64) -> Self {
        self.variables_reference = reference;
        self
    }

    #[must_use]
    pub fn with_indexed_variables(mut self, count: i64) -> Self {
        self.indexed_variables = Some(count);
        self
    }

    #[must_use]
    pub fn with_named_variables(mut self, count: i64) -> Self {
        self.named_variables = Some(count);
        self
    }

    #[must_use]
    pub fn is_expandable(&self) -> bool {
        self.variables_reference != 0
    }
}

/// Trait for rendering [`Value`]s into DAP variables.
pub trait VariableRenderer {
    fn render(&self, name: &str, value: &Value) -> RenderedVariable;

    /// Renders a value that needs a reference ID for lazy expansion of children.
    fn render_with_reference(&self, name: &str, value: &Value, reference_id: i64)
    -> RenderedVariable;

    /// Renders a page of an expandable value's children.
    fn render_children(&self, value: &Value, start: usize, count: usize) -> Vec<RenderedVariable>;
}

/// Default value renderer.
///
/// - Strings are quoted and escaped
/// - Lists/maps show an element-count-bounded preview
/// - References show the referent's brief form
/// - Objects show the class name
#[derive(Debug)]
pub struct DefaultVariableRenderer {
    max_string_length: usize,
    max_list_preview: usize,
    max_map_preview: usize,
}

impl Default for DefaultVariableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultVariableRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self { max_string_length: 100, max_list_preview: 3, max_map_preview: 3 }
    }

    #[must_use]
    pub fn with_max_string_length(mut self, length: usize) -> Self {
        self.max_string_length = length;
        self
    }

    #[must_use]
    pub fn with_max_list_preview(mut self, count: usize) -> Self {
        self.max_list_preview = count;
        self
    }

    #[must_use]
    pub fn with_max_map_preview(mut self, count: usize) -> Self {
        self.max_map_preview = count;
        self
    }

    fn format_string(&self, s: &str) -> String {
        let truncated = if s.len() > self.max_string_length {
            format!("{}...", &s[..self.max_string_length])
        } else {
            s.to_string()
        };

        let escaped = truncated
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\r', "\\r")
            .replace('\t', "\\t");

        format!("\"{}\"", escaped)
    }

    fn format_list_preview(&self, elements: &[Value]) -> String {
        if elements.is_empty() {
            return "[]".to_string();
        }

        let preview: Vec<String> =
            elements.iter().take(self.max_list_preview).map(|v| self.format_value_brief(v)).collect();

        let suffix = if elements.len() > self.max_list_preview {
            format!(", ... ({} total)", elements.len())
        } else {
            String::new()
        };

        format!("[{}{}]", preview.join(", "), suffix)
    }

    fn format_map_preview(&self, pairs: &[(String, Value)]) -> String {
        if pairs.is_empty() {
            return "{}".to_string();
        }

        let preview: Vec<String> = pairs
            .iter()
            .take(self.max_map_preview)
            .map(|(k, v)| format!("{}: {}", k, self.format_value_brief(v)))
            .collect();

        let suffix = if pairs.len() > self.max_map_preview {
            format!(", ... ({} keys)", pairs.len())
        } else {
            String::new()
        };

        format!("{{{}{}}}", preview.join(", "), suffix)
    }

    fn format_value_brief(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => self.format_string(s),
            Value::Float(n) => n.to_string(),
            Value::Int(i) => i.to_string(),
            Value::List(elements) => format!("list({})", elements.len()),
            Value::Map(pairs) => format!("map({})", pairs.len()),
            Value::Ref(inner) => format!("&{}", inner.type_name()),
            Value::Object { class, .. } => format!("{}(...)", class),
            Value::Function { name } => {
                name.as_ref().map_or_else(|| "<function>".to_string(), |n| format!("<function {}>", n))
            }
            Value::Truncated { summary, .. } => summary.clone(),
            Value::Error(msg) => format!("<error: {}>", msg),
        }
    }

    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => self.format_string(s),
            Value::Float(n) => n.to_string(),
            Value::Int(i) => i.to_string(),
            Value::List(elements) => self.format_list_preview(elements),
            Value::Map(pairs) => self.format_map_preview(pairs),
            Value::Ref(inner) => format!("&{}", self.format_value_brief(inner)),
            Value::Object { class, value } => format!("{}({})", class, self.format_value_brief(value)),
            Value::Function { name } => {
                name.as_ref().map_or_else(|| "<function>".to_string(), |n| format!("<function {}>", n))
            }
            Value::Truncated { summary, total_count } => {
                if let Some(count) = total_count {
                    format!("{} ({} total)", summary, count)
                } else {
                    summary.clone()
                }
            }
            Value::Error(msg) => format!("<error: {}>", msg),
        }
    }
}

impl VariableRenderer for DefaultVariableRenderer {
    fn render(&self, name: &str, value: &Value) -> RenderedVariable {
        let formatted_value = self.format_value(value);
        let type_name = value.type_name().to_string();

        let mut rendered = RenderedVariable::new(name, formatted_value).with_type(type_name);

        match value {
            Value::List(elements) => {
                rendered.indexed_variables = Some(elements.len() as i64);
            }
            Value::Map(pairs) => {
                rendered.named_variables = Some(pairs.len() as i64);
            }
            Value::Object { value: inner, .. } => {
                if let Value::Map(pairs) = inner.as_ref() {
                    rendered.named_variables = Some(pairs.len() as i64);
                }
            }
            _ => {}
        }

        rendered
    }

    fn render_with_reference(
        &self,
        name: &str,
        value: &Value,
        reference_id: i64,
    ) -> RenderedVariable {
        let mut rendered = self.render(name, value);
        if value.is_expandable() {
            rendered.variables_reference = reference_id;
        }
        rendered
    }

    fn render_children(&self, value: &Value, start: usize, count: usize) -> Vec<RenderedVariable> {
        match value {
            Value::List(elements) => elements
                .iter()
                .enumerate()
                .skip(start)
                .take(count)
                .map(|(i, v)| self.render(&format!("[{}]", i), v))
                .collect(),
            Value::Map(pairs) => {
                pairs.iter().skip(start).take(count).map(|(k, v)| self.render(k, v)).collect()
            }
            Value::Ref(inner) => vec![self.render("*", inner)],
            Value::Object { value: inner, .. } => self.render_children(inner, start, count),
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_scalar() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::Str("hello".to_string());
        let rendered = renderer.render("x", &value);

        assert_eq!(rendered.name, "x");
        assert_eq!(rendered.value, "\"hello\"");
        assert_eq!(rendered.type_name, Some("str".to_string()));
        assert_eq!(rendered.variables_reference, 0);
    }

    #[test]
    fn render_integer() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::Int(42);
        let rendered = renderer.render("n", &value);

        assert_eq!(rendered.value, "42");
        assert_eq!(rendered.type_name, Some("int".to_string()));
    }

    #[test]
    fn render_list() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let rendered = renderer.render("arr", &value);

        assert!(rendered.value.starts_with('['));
        assert_eq!(rendered.type_name, Some("list".to_string()));
        assert_eq!(rendered.indexed_variables, Some(3));
    }

    #[test]
    fn render_map() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::Map(vec![
            ("key1".to_string(), Value::Str("value1".to_string())),
            ("key2".to_string(), Value::Int(42)),
        ]);
        let rendered = renderer.render("h", &value);

        assert!(rendered.value.starts_with('{'));
        assert_eq!(rendered.type_name, Some("map".to_string()));
        assert_eq!(rendered.named_variables, Some(2));
    }

    #[test]
    fn render_with_reference_sets_handle_only_if_expandable() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::List(vec![Value::Int(1)]);
        let rendered = renderer.render_with_reference("arr", &value, 42);

        assert_eq!(rendered.variables_reference, 42);
        assert!(rendered.is_expandable());

        let scalar = Value::Int(1);
        let rendered = renderer.render_with_reference("n", &scalar, 42);
        assert_eq!(rendered.variables_reference, 0);
    }

    #[test]
    fn render_children_list() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        let children = renderer.render_children(&value, 0, 10);

        assert_eq!(children.len(), 3);
        assert_eq!(children[0].name, "[0]");
        assert_eq!(children[0].value, "10");
    }

    #[test]
    fn render_children_respects_pagination() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::List((0..10).map(Value::Int).collect());
        let page = renderer.render_children(&value, 5, 3);

        assert_eq!(page.len(), 3);
        assert_eq!(page[0].name, "[5]");
    }

    #[test]
    fn render_object() {
        let renderer = DefaultVariableRenderer::new();
        let value = Value::Object {
            class: "MyClass".to_string(),
            value: Box::new(Value::Map(vec![("attr".to_string(), Value::str("value"))])),
        };
        let rendered = renderer.render("obj", &value);

        assert!(rendered.value.contains("MyClass"));
        assert_eq!(rendered.type_name, Some("object".to_string()));
        assert_eq!(rendered.named_variables, Some(1));
    }

    #[test]
    fn string_truncation_and_escaping() {
        let renderer = DefaultVariableRenderer::new().with_max_string_length(10);
        let value = Value::Str("this is a very long string".to_string());
        let rendered = renderer.render("s", &value);
        assert!(rendered.value.contains("..."));

        let renderer = DefaultVariableRenderer::new();
        let value = Value::Str("line1\nline2\ttab".to_string());
        let rendered = renderer.render("s", &value);
        assert!(rendered.value.contains("\\n"));
        assert!(rendered.value.contains("\\t"));
    }
}
