//! Runtime error types for the Brindle system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//! Compile-time problems (unresolved imports, unknown fields) are not errors
//! of this kind; the rule compiler accumulates those as diagnostics instead.

use std::fmt;

use thiserror::Error;

use crate::handle::FactHandle;
use crate::types::Type;

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Brindle runtime operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: Type, actual: Type) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates an arity mismatch error.
    #[must_use]
    pub fn arity_mismatch(name: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::new(ErrorKind::ArityMismatch {
            name: name.into(),
            expected,
            actual,
        })
    }

    /// Creates an unknown fact error.
    #[must_use]
    pub fn unknown_fact(handle: FactHandle) -> Self {
        Self::new(ErrorKind::UnknownFact(handle))
    }

    /// Creates an unknown type error.
    #[must_use]
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownType(name.into()))
    }

    /// Creates an unknown field error.
    #[must_use]
    pub fn unknown_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownField {
            type_name: type_name.into(),
            field: field.into(),
        })
    }

    /// Creates an unknown global error.
    #[must_use]
    pub fn unknown_global(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownGlobal(name.into()))
    }

    /// Creates a consequence failure wrapping the error raised by the rule.
    #[must_use]
    pub fn consequence_failure(rule: impl Into<String>, source: Error) -> Self {
        Self::new(ErrorKind::ConsequenceFailure {
            rule: rule.into(),
            source: Box::new(source),
        })
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Creates a snapshot mismatch error.
    #[must_use]
    pub fn snapshot_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SnapshotMismatch(message.into()))
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SerializationError(message.into()))
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal(message.into()))
    }

    /// Returns the name of the rule whose consequence failed, if this is a
    /// consequence failure.
    #[must_use]
    pub fn failed_rule(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::ConsequenceFailure { rule, .. } => Some(rule),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::IoError(err.to_string()))
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Type mismatch during evaluation.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: Type,
        /// The actual type encountered.
        actual: Type,
    },

    /// Wrong number of arguments to a callable.
    #[error("arity mismatch calling {name}: expected {expected}, got {actual}")]
    ArityMismatch {
        /// The callable that was invoked.
        name: String,
        /// Expected number of arguments.
        expected: usize,
        /// Actual number of arguments.
        actual: usize,
    },

    /// Fact handle does not refer to a fact in working memory.
    #[error("unknown fact: {0}")]
    UnknownFact(FactHandle),

    /// Type is not present in the catalog.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// Field is not declared on the type.
    #[error("unknown field: {field} on {type_name}")]
    UnknownField {
        /// The type that was accessed.
        type_name: String,
        /// The field name that was not found.
        field: String,
    },

    /// Global is not declared by any package.
    #[error("unknown global: {0}")]
    UnknownGlobal(String),

    /// Method does not exist for the receiver.
    #[error("undefined method: {method} on {receiver}")]
    UndefinedMethod {
        /// The method name.
        method: String,
        /// The receiver type.
        receiver: Type,
    },

    /// A definition with this name already exists.
    #[error("duplicate definition: {0}")]
    DuplicateDefinition(String),

    /// Division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Index out of bounds.
    #[error("index out of bounds: {index} (length {length})")]
    IndexOutOfBounds {
        /// The index that was accessed.
        index: i64,
        /// The actual length of the collection.
        length: usize,
    },

    /// A rule consequence raised an error; the firing loop was aborted.
    #[error("consequence of rule '{rule}' failed: {source}")]
    ConsequenceFailure {
        /// The rule whose consequence failed.
        rule: String,
        /// The underlying failure.
        source: Box<Error>,
    },

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),

    /// Operation on a session that has been disposed.
    #[error("session has been disposed")]
    SessionDisposed,

    /// Snapshot does not fit the knowledge base it is restored against.
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),

    /// Snapshot encoding or decoding failed.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Reading or writing a snapshot file failed.
    #[error("io error: {0}")]
    IoError(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// Maximum rule firings in one firing loop exceeded.
    MaxActivations {
        /// The configured limit.
        limit: u32,
        /// The rule that would have fired next.
        context: Option<String>,
    },
    /// Maximum nested function call depth exceeded.
    MaxCallDepth {
        /// The configured limit.
        limit: usize,
        /// The function being entered.
        function: Option<String>,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxActivations { limit, context } => {
                write!(f, "max activations ({limit}) exceeded")?;
                if let Some(ctx) = context {
                    write!(f, ": {ctx}")?;
                }
                Ok(())
            }
            Self::MaxCallDepth { limit, function } => {
                write!(f, "max call depth ({limit}) exceeded")?;
                if let Some(name) = function {
                    write!(f, " in {name}")?;
                }
                Ok(())
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Package or rule name.
    pub source: Option<String>,
    /// Fact involved, if any.
    pub fact: Option<FactHandle>,
    /// Stack of rule/function frames.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the fact involved.
    #[must_use]
    pub fn with_fact(mut self, fact: FactHandle) -> Self {
        self.fact = Some(fact);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "at {source}")?;
        }
        if let Some(fact) = self.fact {
            write!(f, " ({fact})")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
