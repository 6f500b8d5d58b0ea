use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics stored before the rest are only counted.
pub const MAX_DIAGNOSTICS: usize = 20;

/// Diagnostic severity. Only `Error` blocks execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// Diagnostic category, determined by code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Syntax,
    Type,
    Scope,
    Control,
    Lint,
    Internal,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Type => write!(f, "type"),
            Self::Scope => write!(f, "scope"),
            Self::Control => write!(f, "control"),
            Self::Lint => write!(f, "lint"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Numeric diagnostic code (E100–E999, W600–W699).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiagnosticCode(pub u16);

impl DiagnosticCode {
    // ── Syntax (E100–E199) ──
    pub const UNEXPECTED_TOKEN: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const INVALID_CHARACTER: Self = Self(102);
    pub const INVALID_NUMBER: Self = Self(103);
    pub const RESERVED_WORD: Self = Self(104);
    pub const EXPECTED_EXPRESSION: Self = Self(105);
    pub const NESTING_TOO_DEEP: Self = Self(106);

    // ── Types (E200–E299) ──
    pub const UNKNOWN_TYPE: Self = Self(200);
    pub const TYPE_MISMATCH: Self = Self(201);
    pub const WRONG_ARG_COUNT: Self = Self(202);
    pub const UNKNOWN_PROPERTY: Self = Self(203);
    pub const NOT_CALLABLE: Self = Self(204);
    pub const EMPTY_ARRAY_NEEDS_TYPE: Self = Self(205);
    pub const INVALID_OPERANDS: Self = Self(206);
    pub const MISSING_ANNOTATION: Self = Self(207);

    // ── Scope (E300–E399) ──
    pub const UNKNOWN_NAME: Self = Self(300);
    pub const ALREADY_DECLARED: Self = Self(301);
    pub const ASSIGN_TO_CONST: Self = Self(302);
    pub const NESTED_FUNCTION: Self = Self(303);
    pub const CONST_WITHOUT_INIT: Self = Self(304);

    // ── Control flow (E400–E499) ──
    pub const BREAK_OUTSIDE_LOOP: Self = Self(400);
    pub const RETURN_OUTSIDE_FUNCTION: Self = Self(401);
    pub const MISSING_RETURN: Self = Self(402);
    pub const VOID_VALUE_USED: Self = Self(403);

    // ── Lints (W600–W699) ──
    pub const UNUSED_VARIABLE: Self = Self(600);
    pub const UNREACHABLE_CODE: Self = Self(601);
    pub const LOOSE_EQUALITY: Self = Self(602);

    // ── Internal (E900) ──
    pub const INTERNAL_COMPILER_FAULT: Self = Self(900);

    /// Get the category for this code.
    pub fn category(self) -> DiagnosticCategory {
        match self.0 {
            100..=199 => DiagnosticCategory::Syntax,
            200..=299 => DiagnosticCategory::Type,
            300..=399 => DiagnosticCategory::Scope,
            400..=499 => DiagnosticCategory::Control,
            600..=699 => DiagnosticCategory::Lint,
            _ => DiagnosticCategory::Internal,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category() {
            DiagnosticCategory::Lint => write!(f, "W{}", self.0),
            _ => write!(f, "E{}", self.0),
        }
    }
}

/// A structured compiler diagnostic.
///
/// The presentation layer renders these through `Display`; it never parses
/// the message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Source file name.
    pub file: String,
    pub code: DiagnosticCode,
    pub severity: Severity,
    /// Derived from `code`.
    pub category: DiagnosticCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    /// The exact source line for context.
    pub source_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn new(
        file: impl Into<String>,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(
        file: impl Into<String>,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(file, code, message, span, source_line)
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} [{}] {}",
            self.span, self.severity, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for Diagnostic {}

/// Ordered diagnostics of one compilation, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl Diagnostics {
    /// Create an empty list.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check if any blocking diagnostic was reported, stored or not.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add a diagnostic, respecting the MAX_DIAGNOSTICS limit.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.total_errors += 1,
            Severity::Warning => self.total_warnings += 1,
            Severity::Info => {}
        }
        if self.entries.len() < MAX_DIAGNOSTICS {
            self.entries.push(diagnostic);
        }
    }

    /// Append every diagnostic of `other`, keeping its order.
    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in other {
            self.push(diagnostic);
        }
    }

    /// Append another list after this one. Totals include entries `other`
    /// only counted.
    pub fn merge(&mut self, other: Diagnostics) {
        let dropped_errors = other.total_errors - other.errors().count();
        let dropped_warnings = other.total_warnings - other.warnings().count();
        self.extend(other.entries);
        self.total_errors += dropped_errors;
        self.total_warnings += dropped_warnings;
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mismatch() -> Diagnostic {
        Diagnostic::new(
            "snippet.ts",
            DiagnosticCode::TYPE_MISMATCH,
            "Type mismatch: expected 'number', found 'string'",
            Span::new(2, 9, 2, 16),
            "let n: number = \"five\";",
        )
    }

    #[test]
    fn test_code_category() {
        assert_eq!(
            DiagnosticCode::UNTERMINATED_STRING.category(),
            DiagnosticCategory::Syntax
        );
        assert_eq!(
            DiagnosticCode::TYPE_MISMATCH.category(),
            DiagnosticCategory::Type
        );
        assert_eq!(
            DiagnosticCode::ASSIGN_TO_CONST.category(),
            DiagnosticCategory::Scope
        );
        assert_eq!(
            DiagnosticCode::BREAK_OUTSIDE_LOOP.category(),
            DiagnosticCategory::Control
        );
        assert_eq!(
            DiagnosticCode::UNUSED_VARIABLE.category(),
            DiagnosticCategory::Lint
        );
        assert_eq!(
            DiagnosticCode::INTERNAL_COMPILER_FAULT.category(),
            DiagnosticCategory::Internal
        );
    }

    #[test]
    fn test_code_display() {
        assert_eq!(DiagnosticCode::TYPE_MISMATCH.to_string(), "E201");
        assert_eq!(DiagnosticCode::UNUSED_VARIABLE.to_string(), "W600");
        assert_eq!(DiagnosticCode::INTERNAL_COMPILER_FAULT.to_string(), "E900");
    }

    #[test]
    fn test_diagnostic_display() {
        assert_eq!(
            mismatch().to_string(),
            "2:9: error E201 [type] Type mismatch: expected 'number', found 'string'"
        );
    }

    #[test]
    fn test_warning_is_not_blocking() {
        let w = Diagnostic::warning(
            "snippet.ts",
            DiagnosticCode::UNUSED_VARIABLE,
            "'x' is declared but never used",
            Span::new(1, 5, 1, 6),
            "let x = 1;",
        );
        assert_eq!(w.severity, Severity::Warning);
        assert!(!w.is_blocking());
        assert!(mismatch().is_blocking());
        assert!(w.to_string().starts_with("1:5: warning W600 [lint]"));
    }

    #[test]
    fn test_diagnostic_json_fields() {
        let d = mismatch().with_suggestion("Use Number(value)");
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"severity\":\"error\""));
        assert!(json.contains("\"category\":\"type\""));
        assert!(json.contains("\"line\":2"));
        assert!(json.contains("\"column\":9"));
        assert!(json.contains("\"suggestion\":\"Use Number(value)\""));

        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_diagnostics_cap() {
        let mut diags = Diagnostics::empty();
        for i in 0..25u32 {
            diags.push(Diagnostic::new(
                "snippet.ts",
                DiagnosticCode::UNEXPECTED_TOKEN,
                format!("Error {i}"),
                Span::point(i + 1, 1),
                "",
            ));
        }
        assert_eq!(diags.len(), MAX_DIAGNOSTICS);
        assert_eq!(diags.total_errors, 25);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_diagnostics_keep_emission_order() {
        let mut diags = Diagnostics::empty();
        diags.push(Diagnostic::warning(
            "snippet.ts",
            DiagnosticCode::UNREACHABLE_CODE,
            "Unreachable code detected",
            Span::point(3, 1),
            "",
        ));
        diags.push(mismatch());
        assert_eq!(diags.entries[0].code, DiagnosticCode::UNREACHABLE_CODE);
        assert_eq!(diags.entries[1].code, DiagnosticCode::TYPE_MISMATCH);
        assert_eq!(diags.errors().count(), 1);
        assert_eq!(diags.warnings().count(), 1);
        assert_eq!(diags.total_warnings, 1);
    }

    #[test]
    fn test_diagnostics_merge_keeps_totals() {
        let mut lex = Diagnostics::empty();
        for _ in 0..25 {
            lex.push(mismatch());
        }
        let mut all = Diagnostics::empty();
        all.merge(lex);
        let mut parse = Diagnostics::empty();
        parse.push(mismatch());
        all.merge(parse);
        assert_eq!(all.len(), MAX_DIAGNOSTICS);
        assert_eq!(all.total_errors, 26);
    }

    #[test]
    fn test_diagnostics_empty() {
        let diags = Diagnostics::empty();
        assert!(!diags.has_errors());
        assert!(diags.is_empty());
    }
}
