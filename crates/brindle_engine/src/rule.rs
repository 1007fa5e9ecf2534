//! Compiled rules.
//!
//! A [`CompiledRule`] is the immutable output of the [`RuleCompiler`]: its
//! conditions are split into single-fact (alpha) tests and join (beta) tests,
//! and its consequence is a list of resolved actions. The matching network
//! consumes these; nothing in them is looked up by name again.

pub mod compiler;

pub use compiler::RuleCompiler;

use std::fmt;
use std::sync::Arc;

use brindle_language::{CompiledExpr, Consequence, FunctionTable, Span, TypeDef};
use serde::{Deserialize, Serialize};

// =============================================================================
// RuleId
// =============================================================================

/// Identity of a rule inside one knowledge base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(u32);

impl RuleId {
    /// Creates an id from its raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

// =============================================================================
// Conditions
// =============================================================================

/// A compiled pattern over one fact type.
#[derive(Clone, Debug)]
pub struct CompiledPattern {
    /// The matched type.
    pub def: Arc<TypeDef>,
    /// Tests that only read the fact under test.
    pub alpha: Vec<CompiledExpr>,
    /// Tests that also read facts matched by earlier patterns.
    pub beta: Vec<CompiledExpr>,
    /// `not Type(...)`.
    pub negated: bool,
    /// Position of the matched fact in the rule's tuple; `None` for negations.
    pub index: Option<usize>,
    /// Source span.
    pub span: Span,
}

impl CompiledPattern {
    /// Returns the fully-qualified name of the matched type.
    #[must_use]
    pub fn type_name(&self) -> &Arc<str> {
        self.def.full_name()
    }
}

/// One compiled condition element.
#[derive(Clone, Debug)]
pub enum CompiledCondition {
    /// A positive or negated pattern.
    Pattern(CompiledPattern),
    /// `eval(expr)` over the tuple so far.
    Eval(CompiledExpr),
}

// =============================================================================
// CompiledRule
// =============================================================================

/// A rule ready to be added to the matching network.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    /// Owning package.
    pub package: Arc<str>,
    /// Rule name, unique within the package.
    pub name: Arc<str>,
    /// Priority (higher fires first).
    pub salience: i32,
    /// Suppress re-activation over the same tuple by the rule's own consequence.
    pub no_loop: bool,
    /// Disabled rules never reach the network.
    pub enabled: bool,
    /// Conditions in order.
    pub conditions: Vec<CompiledCondition>,
    /// Consequence.
    pub consequence: Arc<Consequence>,
    /// Local functions of the owning package.
    pub functions: Arc<FunctionTable>,
    /// Number of facts in a complete match.
    pub arity: usize,
    /// Source span.
    pub span: Span,
}

impl CompiledRule {
    /// Returns `package.name`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }

    /// Returns the compiled patterns in order.
    pub fn patterns(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.conditions.iter().filter_map(|condition| match condition {
            CompiledCondition::Pattern(pattern) => Some(pattern),
            CompiledCondition::Eval(_) => None,
        })
    }
}
