//! Error types for parsing and evaluation.
//!
//! Both error kinds carry the template source and the offending span so they
//! render as full diagnostics through miette, and a 1-based line/column pair
//! for plain `Display` output.

use crate::ast::Span;
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::sync::Arc;
use thiserror::Error;

/// A template's text together with the name used when reporting errors.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    name: String,
    text: Arc<String>,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Arc::new(text.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The source text covered by `span`.
    pub fn slice(&self, span: Span) -> &str {
        self.text.get(span.start..span.end).unwrap_or("")
    }

    /// 1-based line and character column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let before = self.text.get(..offset).unwrap_or("");
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }

    /// Create a NamedSource for miette
    pub fn named_source(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, (*self.text).clone())
    }
}

/// Any failure from [`crate::render`].
#[derive(Error, Debug, Diagnostic)]
pub enum TemplateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Malformed template text. Parsing stops at the first one.
#[derive(Error, Debug, Diagnostic)]
#[error("{message} at line {line}, column {column}")]
#[diagnostic(code(velvet::syntax))]
pub struct SyntaxError {
    pub message: String,
    /// What the parser would have accepted here, if known.
    #[help]
    pub help: Option<String>,
    pub line: usize,
    pub column: usize,
    #[label("here")]
    pub span: SourceSpan,
    #[source_code]
    pub src: NamedSource<String>,
}

impl SyntaxError {
    pub(crate) fn new(
        source: &TemplateSource,
        span: Span,
        message: impl Into<String>,
        expected: Option<String>,
    ) -> Self {
        let (line, column) = source.line_col(span.start);
        Self {
            message: message.into(),
            help: expected.map(|e| format!("expected {e}")),
            line,
            column,
            span: span.into(),
            src: source.named_source(),
        }
    }
}

/// A failure while rendering a parsed template. No partial output survives it.
#[derive(Error, Debug, Diagnostic)]
#[error("{kind} at line {line}, column {column}")]
#[diagnostic(code(velvet::evaluation))]
pub struct EvaluationError {
    pub kind: EvaluationErrorKind,
    #[help]
    pub help: Option<String>,
    pub line: usize,
    pub column: usize,
    #[label("while evaluating this")]
    pub span: SourceSpan,
    #[source_code]
    pub src: NamedSource<String>,
}

impl EvaluationError {
    pub(crate) fn new(source: &TemplateSource, span: Span, kind: EvaluationErrorKind) -> Self {
        let (line, column) = source.line_col(span.start);
        let help = match &kind {
            EvaluationErrorKind::Undefined { available, .. } if !available.is_empty() => {
                Some(format!("defined variables: {}", available.join(", ")))
            }
            EvaluationErrorKind::AmbiguousMethod { candidates, .. } => {
                Some(format!("candidates: {}", candidates.join("; ")))
            }
            _ => None,
        };
        Self {
            kind,
            help,
            line,
            column,
            span: span.into(),
            src: source.named_source(),
        }
    }
}

/// What went wrong during evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvaluationErrorKind {
    #[error("undefined reference `${name}`")]
    Undefined {
        name: String,
        available: Vec<String>,
    },

    #[error("`{reference}` is null")]
    NullValue { reference: String },

    #[error("`{type_name}` has no property `{name}`")]
    NoSuchProperty { type_name: String, name: String },

    #[error("`{type_name}` has no method `{name}` accepting ({arguments})")]
    NoSuchMethod {
        type_name: String,
        name: String,
        arguments: String,
    },

    #[error("call to `{name}` on `{type_name}` is ambiguous")]
    AmbiguousMethod {
        type_name: String,
        name: String,
        candidates: Vec<String>,
    },

    #[error("`{type_name}` cannot be indexed")]
    NotIndexable { type_name: String },

    #[error("`{op}` expects {expected}, found {found}")]
    TypeMismatch {
        op: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("`{op}` by zero")]
    DivisionByZero { op: &'static str },

    #[error("`{method}` failed: {message}")]
    Invocation { method: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_counts_characters() {
        let source = TemplateSource::new("t", "ab\nPá$x");
        assert_eq!(source.line_col(0), (1, 1));
        assert_eq!(source.line_col(3), (2, 1));
        // `á` is two bytes but one column.
        assert_eq!(source.line_col(6), (2, 3));
    }

    #[test]
    fn syntax_error_display_has_position() {
        let source = TemplateSource::new("t", "x\n#set (");
        let err = SyntaxError::new(
            &source,
            Span::new(7, 7),
            "unexpected end of input",
            Some("an expression".to_string()),
        );
        assert_eq!(err.to_string(), "unexpected end of input at line 2, column 6");
        assert_eq!(err.help.as_deref(), Some("expected an expression"));
    }

    #[test]
    fn undefined_lists_available_names() {
        let source = TemplateSource::new("t", "$y");
        let err = EvaluationError::new(
            &source,
            Span::new(0, 2),
            EvaluationErrorKind::Undefined {
                name: "y".into(),
                available: vec!["a".into(), "b".into()],
            },
        );
        assert_eq!(err.to_string(), "undefined reference `$y` at line 1, column 1");
        assert_eq!(err.help.as_deref(), Some("defined variables: a, b"));
    }
}
