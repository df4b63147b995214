//! Stack frame and source data types for the Dapper debug adapter.
//!
//! # Overview
//!
//! - [`StackFrame`] - a single stack frame, independent of any debuggee language
//! - [`StackTraceProvider`] - trait implemented by a backend's stack-trace path
//! - [`FrameClassifier`] - classifies frames as user code vs. library/runtime code
//!
//! Frames are produced by a backend and passed through unchanged; this crate
//! owns only their shape and presentation, never how they were obtained.

mod classifier;

pub use classifier::{FrameCategory, FrameClassifier, PathFrameClassifier};

use serde::{Deserialize, Serialize};

/// A stack frame in the call stack, following the DAP `StackFrame` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Unique identifier for this frame within the debug session.
    pub id: i64,

    /// Name of the frame, typically the function/method name.
    pub name: String,

    /// Source file associated with this frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,

    /// 1-based line number in the source file.
    pub line: i64,

    /// 1-based column number (defaults to 1).
    pub column: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_column: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_restart: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<StackFramePresentationHint>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

impl StackFrame {
    #[must_use]
    pub fn new(id: i64, name: impl Into<String>, source: Option<Source>, line: i64) -> Self {
        Self {
            id,
            name: name.into(),
            source,
            line,
            column: 1,
            end_line: None,
            end_column: None,
            can_restart: None,
            presentation_hint: None,
            module_id: None,
        }
    }

    /// Builds a frame for a qualified callable, e.g. `package.function` or
    /// `Module::sub` depending on the backend's naming convention.
    #[must_use]
    pub fn for_callable(id: i64, qualified_name: impl Into<String>, file: &str, line: i64) -> Self {
        Self::new(id, qualified_name, Some(Source::new(file)), line)
    }

    #[must_use]
    pub fn with_column(mut self, column: i64) -> Self {
        self.column = column;
        self
    }

    #[must_use]
    pub fn with_end(mut self, end_line: i64, end_column: i64) -> Self {
        self.end_line = Some(end_line);
        self.end_column = Some(end_column);
        self
    }

    #[must_use]
    pub fn with_presentation_hint(mut self, hint: StackFramePresentationHint) -> Self {
        self.presentation_hint = Some(hint);
        self
    }

    #[must_use]
    pub fn with_module(mut self, module_id: impl Into<String>) -> Self {
        self.module_id = Some(module_id.into());
        self
    }

    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        self.source.as_ref().and_then(|s| s.path.as_deref())
    }

    /// Returns true if this frame represents user code (not library/runtime).
    #[must_use]
    pub fn is_user_code(&self) -> bool {
        self.presentation_hint.as_ref() != Some(&StackFramePresentationHint::Subtle)
    }
}

impl Default for StackFrame {
    fn default() -> Self {
        Self::new(0, "<unknown>", None, 0)
    }
}

/// Presentation hints for stack frame display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StackFramePresentationHint {
    Normal,
    /// e.g. an exception handler frame.
    Label,
    /// Library/runtime code, typically collapsed in the UI.
    Subtle,
}

/// A source file in the debugging context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Reference ID for retrieving source content dynamically (e.g. an eval body).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,

    /// Origin of the source, e.g. `"eval"` or `"compiled"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<SourcePresentationHint>,
}

impl Source {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        let path_str = path.into();
        let name =
            std::path::Path::new(&path_str).file_name().and_then(|n| n.to_str()).map(String::from);

        Self {
            name,
            path: Some(path_str),
            source_reference: None,
            origin: None,
            presentation_hint: None,
        }
    }

    /// Creates a source with a dynamic reference (no file path), used for
    /// `loadedSource` bodies generated at eval/compile time.
    #[must_use]
    pub fn from_reference(reference: i64, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            path: None,
            source_reference: Some(reference),
            origin: None,
            presentation_hint: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn with_presentation_hint(mut self, hint: SourcePresentationHint) -> Self {
        self.presentation_hint = Some(hint);
        self
    }

    #[must_use]
    pub fn is_eval(&self) -> bool {
        self.origin.as_deref() == Some("eval")
            || self.path.as_ref().is_some_and(|p| p.contains("(eval"))
    }

    #[must_use]
    pub fn has_file(&self) -> bool {
        self.path.is_some() && !self.is_eval()
    }
}

/// Presentation hints for source display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourcePresentationHint {
    Normal,
    Emphasize,
    Deemphasize,
}

/// Trait for providing stack traces, implemented per-backend.
pub trait StackTraceProvider {
    type Error;

    /// Gets the current stack trace, innermost frame first.
    fn get_stack_trace(
        &self,
        thread_id: i64,
        start_frame: usize,
        levels: Option<usize>,
    ) -> Result<Vec<StackFrame>, Self::Error>;

    fn total_frames(&self, thread_id: i64) -> Result<usize, Self::Error>;

    fn get_frame(&self, frame_id: i64) -> Result<Option<StackFrame>, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_frame_new() {
        let frame = StackFrame::new(1, "main.foo", Some(Source::new("/path/to/file.py")), 42);

        assert_eq!(frame.id, 1);
        assert_eq!(frame.name, "main.foo");
        assert_eq!(frame.line, 42);
        assert_eq!(frame.column, 1);
        assert!(frame.source.is_some());
    }

    #[test]
    fn stack_frame_for_callable() {
        let frame = StackFrame::for_callable(1, "pkg.module.do_stuff", "/lib/pkg/module.py", 100);

        assert_eq!(frame.name, "pkg.module.do_stuff");
        assert_eq!(frame.line, 100);
        assert_eq!(frame.file_path(), Some("/lib/pkg/module.py"));
    }

    #[test]
    fn stack_frame_with_presentation_hint() {
        let frame = StackFrame::new(1, "foo", None, 1)
            .with_presentation_hint(StackFramePresentationHint::Subtle);

        assert_eq!(frame.presentation_hint, Some(StackFramePresentationHint::Subtle));
        assert!(!frame.is_user_code());
    }

    #[test]
    fn source_new() {
        let source = Source::new("/path/to/file.py");

        assert_eq!(source.path, Some("/path/to/file.py".to_string()));
        assert_eq!(source.name, Some("file.py".to_string()));
    }

    #[test]
    fn source_is_eval() {
        let eval_source = Source::new("(eval 42)");
        assert!(eval_source.is_eval());

        let file_source = Source::new("/path/to/file.py");
        assert!(!file_source.is_eval());

        let origin_eval = Source::new("/path/to/file.py").with_origin("eval");
        assert!(origin_eval.is_eval());
    }

    #[test]
    fn source_has_file() {
        let file_source = Source::new("/path/to/file.py");
        assert!(file_source.has_file());

        let eval_source = Source::new("(eval 42)");
        assert!(!eval_source.has_file());

        let ref_source = Source::from_reference(1, "dynamic");
        assert!(!ref_source.has_file());
    }

    #[test]
    fn source_from_reference() {
        let source = Source::from_reference(42, "eval code");

        assert_eq!(source.source_reference, Some(42));
        assert_eq!(source.name, Some("eval code".to_string()));
        assert!(source.path.is_none());
    }
}
