//! Frame classifier for distinguishing user code from library/runtime code.

use crate::{StackFrame, StackFramePresentationHint};

/// Categories for stack frame classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCategory {
    /// User code (the developer's own code).
    User,
    /// Third-party library/dependency code.
    Library,
    /// Language runtime or standard-library internals.
    Runtime,
    /// Eval-generated code.
    Eval,
    /// Unknown origin.
    Unknown,
}

impl FrameCategory {
    #[must_use]
    pub fn presentation_hint(&self) -> StackFramePresentationHint {
        match self {
            FrameCategory::User => StackFramePresentationHint::Normal,
            FrameCategory::Eval => StackFramePresentationHint::Label,
            FrameCategory::Library | FrameCategory::Runtime | FrameCategory::Unknown => {
                StackFramePresentationHint::Subtle
            }
        }
    }

    #[must_use]
    pub fn is_user_code(&self) -> bool {
        matches!(self, FrameCategory::User)
    }

    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self, FrameCategory::Library | FrameCategory::Runtime)
    }
}

/// Trait for classifying stack frames.
pub trait FrameClassifier {
    fn classify(&self, frame: &StackFrame) -> FrameCategory;

    /// Classifies a frame and sets its presentation hint accordingly.
    fn apply_classification(&self, frame: StackFrame) -> StackFrame {
        let category = self.classify(&frame);
        frame.with_presentation_hint(category.presentation_hint())
    }

    /// Classifies and optionally filters out external frames.
    fn classify_all(&self, frames: Vec<StackFrame>, include_external: bool) -> Vec<StackFrame> {
        frames
            .into_iter()
            .map(|f| self.apply_classification(f))
            .filter(|f| include_external || f.is_user_code())
            .collect()
    }
}

/// Path-based frame classifier.
///
/// Classifies frames by matching their source path against configured user
/// and library path prefixes, plus a small set of built-in runtime/stdlib
/// path patterns. Backends supply the `justMyCode`-relevant paths; this
/// classifier never inspects file content.
#[derive(Debug, Default)]
pub struct PathFrameClassifier {
    user_paths: Vec<String>,
    library_paths: Vec<String>,
    runtime_paths: Vec<String>,
}

impl PathFrameClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self { user_paths: Vec::new(), library_paths: Vec::new(), runtime_paths: Vec::new() }
    }

    #[must_use]
    pub fn with_user_path(mut self, path: impl Into<String>) -> Self {
        self.user_paths.push(path.into());
        self
    }

    #[must_use]
    pub fn with_library_path(mut self, path: impl Into<String>) -> Self {
        self.library_paths.push(path.into());
        self
    }

    /// Adds a path prefix (e.g. a venv's standard-library directory)
    /// classified as language-runtime code.
    #[must_use]
    pub fn with_runtime_path(mut self, path: impl Into<String>) -> Self {
        self.runtime_paths.push(path.into());
        self
    }

    fn is_under(paths: &[String], path: &str) -> bool {
        paths.iter().any(|p| path.starts_with(p.as_str()))
    }

    fn is_eval_source(path: &str) -> bool {
        path.starts_with("(eval") || path.contains("(eval ")
    }
}

impl FrameClassifier for PathFrameClassifier {
    fn classify(&self, frame: &StackFrame) -> FrameCategory {
        let path = match frame.file_path() {
            Some(p) => p,
            None => return FrameCategory::Unknown,
        };

        if Self::is_eval_source(path) || frame.source.as_ref().is_some_and(|s| s.is_eval()) {
            return FrameCategory::Eval;
        }

        if Self::is_under(&self.user_paths, path) {
            return FrameCategory::User;
        }

        if Self::is_under(&self.runtime_paths, path) {
            return FrameCategory::Runtime;
        }

        if Self::is_under(&self.library_paths, path) {
            return FrameCategory::Library;
        }

        // Default to user code: we'd rather show an unrecognized frame than hide it.
        FrameCategory::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Source;

    fn frame_with_path(path: &str) -> StackFrame {
        StackFrame::new(1, "test", Some(Source::new(path)), 1)
    }

    #[test]
    fn classify_user_code() {
        let classifier = PathFrameClassifier::new();
        let frame = frame_with_path("/home/user/project/app.py");
        assert_eq!(classifier.classify(&frame), FrameCategory::User);
    }

    #[test]
    fn classify_runtime() {
        let classifier = PathFrameClassifier::new().with_runtime_path("/usr/lib/python3.12/");
        let frame = frame_with_path("/usr/lib/python3.12/threading.py");
        assert_eq!(classifier.classify(&frame), FrameCategory::Runtime);
    }

    #[test]
    fn classify_library_code() {
        let classifier = PathFrameClassifier::new().with_library_path("/home/user/project/.venv/");
        let frame = frame_with_path("/home/user/project/.venv/lib/requests/api.py");
        assert_eq!(classifier.classify(&frame), FrameCategory::Library);
    }

    #[test]
    fn classify_eval() {
        let classifier = PathFrameClassifier::new();

        let frame = frame_with_path("(eval 42)");
        assert_eq!(classifier.classify(&frame), FrameCategory::Eval);

        let mut frame = frame_with_path("/path/file.py");
        frame.source = Some(Source::new("/path/file.py").with_origin("eval"));
        assert_eq!(classifier.classify(&frame), FrameCategory::Eval);
    }

    #[test]
    fn classify_no_source() {
        let classifier = PathFrameClassifier::new();
        let frame = StackFrame::new(1, "test", None, 1);
        assert_eq!(classifier.classify(&frame), FrameCategory::Unknown);
    }

    #[test]
    fn explicit_user_path_wins_over_library_pattern() {
        let classifier = PathFrameClassifier::new().with_user_path("/my/project/");
        let frame = frame_with_path("/my/project/vendor/thing.py");
        assert_eq!(classifier.classify(&frame), FrameCategory::User);
    }

    #[test]
    fn frame_category_presentation_hint() {
        assert_eq!(FrameCategory::User.presentation_hint(), StackFramePresentationHint::Normal);
        assert_eq!(FrameCategory::Library.presentation_hint(), StackFramePresentationHint::Subtle);
        assert_eq!(FrameCategory::Runtime.presentation_hint(), StackFramePresentationHint::Subtle);
        assert_eq!(FrameCategory::Eval.presentation_hint(), StackFramePresentationHint::Label);
    }

    #[test]
    fn apply_classification_sets_hint() {
        let classifier = PathFrameClassifier::new().with_runtime_path("/usr/lib/python3.12/");
        let frame = frame_with_path("/usr/lib/python3.12/threading.py");

        let classified = classifier.apply_classification(frame);
        assert_eq!(classified.presentation_hint, Some(StackFramePresentationHint::Subtle));
    }

    #[test]
    fn classify_all_filters_external() {
        let classifier = PathFrameClassifier::new().with_runtime_path("/usr/lib/python3.12/");

        let frames = vec![
            frame_with_path("/home/user/project/app.py"),
            frame_with_path("/usr/lib/python3.12/threading.py"),
            frame_with_path("/home/user/project/lib/helpers.py"),
        ];

        assert_eq!(classifier.classify_all(frames.clone(), true).len(), 3);
        assert_eq!(classifier.classify_all(frames, false).len(), 2);
    }

    #[test]
    fn is_user_code_and_is_external() {
        assert!(FrameCategory::User.is_user_code());
        assert!(!FrameCategory::Library.is_user_code());
        assert!(!FrameCategory::Runtime.is_user_code());
        assert!(!FrameCategory::Eval.is_user_code());

        assert!(!FrameCategory::User.is_external());
        assert!(FrameCategory::Library.is_external());
        assert!(FrameCategory::Runtime.is_external());
        assert!(!FrameCategory::Eval.is_external());
    }
}
