//! Compile-time diagnostics.
//!
//! Compilation is best-effort: a problem in one rule is recorded and the
//! compiler moves on, so callers see every error in a package at once. A
//! build with any error-severity diagnostic produces no knowledge base.

use std::fmt;

use thiserror::Error;

use crate::span::Span;

/// How serious a diagnostic is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational; does not fail the build.
    Warning,
    /// Fails the build.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Categories of compile-time problems.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompileErrorKind {
    /// The same short type name imported from two different places.
    DuplicateImport,
    /// The same short function name explicitly imported from two holders.
    Conflict,
    /// A name that resolves to nothing.
    UnresolvedSymbol,
    /// A name that resolves to more than one thing.
    AmbiguousSymbol,
    /// A field that the resolved type does not declare.
    UnknownField,
    /// The matching network could not accept the rule.
    BuildError,
    /// An expression whose static type does not fit where it is used.
    TypeMismatch,
    /// An expression or statement that is malformed in context.
    InvalidExpression,
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DuplicateImport => "duplicate import",
            Self::Conflict => "conflicting import",
            Self::UnresolvedSymbol => "unresolved symbol",
            Self::AmbiguousSymbol => "ambiguous symbol",
            Self::UnknownField => "unknown field",
            Self::BuildError => "build error",
            Self::TypeMismatch => "type mismatch",
            Self::InvalidExpression => "invalid expression",
        };
        write!(f, "{s}")
    }
}

/// One compile-time problem.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct CompileError {
    /// Severity.
    pub severity: Severity,
    /// Category.
    pub kind: CompileErrorKind,
    /// Package the problem was found in.
    pub package: Option<String>,
    /// Rule (or function) the problem was found in.
    pub rule: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// The offending symbol, if there is one.
    pub symbol: Option<String>,
    /// Source location, if known.
    pub span: Option<Span>,
}

impl CompileError {
    /// Creates an error-severity diagnostic.
    #[must_use]
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            package: None,
            rule: None,
            message: message.into(),
            symbol: None,
            span: None,
        }
    }

    /// `name` does not resolve to anything.
    #[must_use]
    pub fn unresolved(what: &str, name: &str) -> Self {
        Self::new(
            CompileErrorKind::UnresolvedSymbol,
            format!("unable to resolve {what} '{name}'"),
        )
        .with_symbol(name)
    }

    /// `name` resolves to several candidates.
    #[must_use]
    pub fn ambiguous(name: &str, candidates: &[String]) -> Self {
        Self::new(
            CompileErrorKind::AmbiguousSymbol,
            format!("'{name}' is ambiguous: {}", candidates.join(", ")),
        )
        .with_symbol(name)
    }

    /// `field` is not declared on `type_name`.
    #[must_use]
    pub fn unknown_field(type_name: &str, field: &str) -> Self {
        Self::new(
            CompileErrorKind::UnknownField,
            format!("type '{type_name}' has no field '{field}'"),
        )
        .with_symbol(field)
    }

    /// A type mismatch.
    #[must_use]
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::TypeMismatch, message)
    }

    /// An invalid expression.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(CompileErrorKind::InvalidExpression, message)
    }

    /// Builder method to downgrade to a warning.
    #[must_use]
    pub fn as_warning(mut self) -> Self {
        self.severity = Severity::Warning;
        self
    }

    /// Builder method to set the package.
    #[must_use]
    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Builder method to set the rule.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Builder method to set the symbol.
    #[must_use]
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Builder method to set the span, keeping an existing one.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        if self.span.is_none() && span != Span::default() {
            self.span = Some(span);
        }
        self
    }

    /// Returns true if this diagnostic fails the build.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.kind)?;
        match (&self.package, &self.rule) {
            (Some(package), Some(rule)) => write!(f, " in {package}/{rule}")?,
            (Some(package), None) => write!(f, " in {package}")?,
            (None, Some(rule)) => write!(f, " in {rule}")?,
            (None, None) => {}
        }
        if let Some(span) = self.span {
            write!(f, " at {span}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// An accumulator for diagnostics.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<CompileError>,
}

impl Diagnostics {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one diagnostic.
    pub fn push(&mut self, error: CompileError) {
        self.entries.push(error);
    }

    /// Records several diagnostics.
    pub fn extend(&mut self, errors: impl IntoIterator<Item = CompileError>) {
        self.entries.extend(errors);
    }

    /// Returns true if any error-severity diagnostic was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(CompileError::is_error)
    }

    /// Returns every recorded diagnostic in the order found.
    #[must_use]
    pub fn errors(&self) -> &[CompileError] {
        &self.entries
    }

    /// Returns only warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &CompileError> {
        self.entries.iter().filter(|e| !e.is_error())
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the accumulator.
    #[must_use]
    pub fn into_errors(self) -> Vec<CompileError> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location() {
        let err = CompileError::unresolved("type", "MissingClass")
            .with_package("org.example")
            .with_rule("rule1")
            .with_span(Span::at(4, 9));
        let msg = format!("{err}");
        assert_eq!(
            msg,
            "error: unresolved symbol in org.example/rule1 at 4:9: unable to resolve type 'MissingClass'"
        );
        assert_eq!(err.symbol.as_deref(), Some("MissingClass"));
    }

    #[test]
    fn warnings_do_not_fail() {
        let mut diags = Diagnostics::new();
        diags.push(CompileError::invalid("unused binding").as_warning());
        assert!(!diags.has_errors());
        assert_eq!(diags.warnings().count(), 1);

        diags.push(CompileError::unknown_field("Cheese", "colour"));
        assert!(diags.has_errors());
        assert_eq!(diags.errors().len(), 2);
    }

    #[test]
    fn with_span_keeps_first() {
        let err = CompileError::invalid("x")
            .with_span(Span::at(1, 1))
            .with_span(Span::at(9, 9));
        assert_eq!(err.span, Some(Span::at(1, 1)));
    }
}
