//! Structured compile-time diagnostics and their renderer.

use std::fmt;

use crate::source::SourceFile;
use crate::span::Span;

/// Every way a DAISY program can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    LexicalError,
    SyntaxError,
    UnknownSymbol,
    TypeMismatch,
    UnresolvedTraitBound,
    AmbiguousImpl,
    GenericArityMismatch,
    NonExhaustiveMatch,
    UseAfterMove,
    BorrowAliasConflict,
    ReleaseWithLiveBorrow,
    UnsafeWithoutJustification,
    AbiIncompatible,
    ImportCycle,
    InternalError,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::LexicalError => "LexicalError",
            DiagnosticKind::SyntaxError => "SyntaxError",
            DiagnosticKind::UnknownSymbol => "UnknownSymbol",
            DiagnosticKind::TypeMismatch => "TypeMismatch",
            DiagnosticKind::UnresolvedTraitBound => "UnresolvedTraitBound",
            DiagnosticKind::AmbiguousImpl => "AmbiguousImpl",
            DiagnosticKind::GenericArityMismatch => "GenericArityMismatch",
            DiagnosticKind::NonExhaustiveMatch => "NonExhaustiveMatch",
            DiagnosticKind::UseAfterMove => "UseAfterMove",
            DiagnosticKind::BorrowAliasConflict => "BorrowAliasConflict",
            DiagnosticKind::ReleaseWithLiveBorrow => "ReleaseWithLiveBorrow",
            DiagnosticKind::UnsafeWithoutJustification => "UnsafeWithoutJustification",
            DiagnosticKind::AbiIncompatible => "AbiIncompatible",
            DiagnosticKind::ImportCycle => "ImportCycle",
            DiagnosticKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// A secondary span with its own note, e.g. a move origin.
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub span: Option<Span>,
    pub labels: Vec<Label>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Self { kind, message: message.into(), span, labels: Vec::new() }
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: message.into() });
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "L{}:{} {}: {}", span.line, span.column, self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Renders diagnostics with source context: the offending line plus a caret
/// underline, then any labeled secondary spans.
pub struct Renderer<'a> {
    source: &'a SourceFile,
}

impl<'a> Renderer<'a> {
    pub fn new(source: &'a SourceFile) -> Self {
        Self { source }
    }

    pub fn render(&self, diag: &Diagnostic) -> String {
        let mut out = String::new();
        out.push_str(&format!("error[{}]: {}\n", diag.kind, diag.message));
        if let Some(span) = diag.span {
            out.push_str(&format!("  --> {}:{}:{}\n", self.source.name, span.line, span.column));
            out.push_str(&self.context(span));
        }
        for label in &diag.labels {
            out.push_str(&format!(
                "  note: {} ({}:{}:{})\n",
                label.message, self.source.name, label.span.line, label.span.column
            ));
            out.push_str(&self.context(label.span));
        }
        out
    }

    fn context(&self, span: Span) -> String {
        let line = self.source.line_text(span.line);
        let col = span.column.saturating_sub(1) as usize;
        let width = line.chars().count().saturating_sub(col);
        let caret_len = span_char_len(line, span).clamp(1, width.max(1));
        format!(
            "{:>4} | {}\n     | {}{}\n",
            span.line,
            line,
            " ".repeat(col),
            "^".repeat(caret_len)
        )
    }
}

fn span_char_len(line: &str, span: Span) -> usize {
    // Byte length translated to a character count on this line, best effort.
    let bytes = span.len().max(1);
    line.chars().take(bytes).count().min(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceFile;

    #[test]
    fn display_includes_kind_and_position() {
        let d = Diagnostic::new(
            DiagnosticKind::TypeMismatch,
            "expected int, found bool",
            Some(Span::new(0, 10, 14, 2, 3)),
        );
        assert_eq!(d.to_string(), "L2:3 TypeMismatch: expected int, found bool");
    }

    #[test]
    fn renderer_points_at_line() {
        let sf = SourceFile::new(0, "t.dsy".into(), "module m\nlet x = y\n");
        let d = Diagnostic::new(
            DiagnosticKind::UnknownSymbol,
            "undefined name: y",
            Some(Span::new(0, 17, 18, 2, 9)),
        );
        let rendered = Renderer::new(&sf).render(&d);
        assert!(rendered.contains("let x = y"));
        assert!(rendered.contains("^"));
        assert!(rendered.contains("t.dsy:2:9"));
    }

    #[test]
    fn labels_render_their_own_context() {
        let sf = SourceFile::new(0, "t.dsy".into(), "let a = buffer(8)\nlet b = move a\nprint a\n");
        let d = Diagnostic::new(
            DiagnosticKind::UseAfterMove,
            "use of moved value: a",
            Some(Span::new(0, 39, 40, 3, 7)),
        )
        .with_label(Span::new(0, 26, 32, 2, 9), "value moved here");
        let rendered = Renderer::new(&sf).render(&d);
        assert!(rendered.contains("value moved here"));
        assert!(rendered.contains("print a"));
        assert!(rendered.contains("let b = move a"));
    }
}
