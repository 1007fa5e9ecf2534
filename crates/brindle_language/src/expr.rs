//! Resolved expression and action IR.
//!
//! Everything here is produced by the [`ExprCompiler`](crate::compiler::ExprCompiler)
//! and owns whatever it needs to run: native callables are held directly,
//! local functions by index into the package's [`FunctionTable`], and variables
//! by tuple index or frame slot. Names are never looked up again at runtime.

use std::sync::Arc;

use brindle_foundation::Value;

use crate::ast::{BinaryOp, UnaryOp};
use crate::catalog::TypeDef;
use crate::methods::{BuiltinMethod, ListMutator};
use crate::symbols::{CallableTarget, Signature};

/// A resolved expression.
///
/// Structural equality and hashing are used by the matching network to share
/// identical tests between rules.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompiledExpr {
    /// A constant (literal or static constant).
    Const(Value),
    /// A frame slot (consequence local or function parameter).
    Local(usize),
    /// The whole fact at a tuple index.
    Fact(usize),
    /// A field of the fact at a tuple index.
    FactField {
        /// Tuple index.
        index: usize,
        /// Field name.
        field: Arc<str>,
    },
    /// A field of the fact being tested by the current pattern.
    CurrentField(Arc<str>),
    /// A global, read at evaluation time.
    Global(Arc<str>),
    /// A field of an object-valued expression.
    Field {
        /// Object expression.
        target: Box<CompiledExpr>,
        /// Field name.
        field: Arc<str>,
    },
    /// A call to a native or local function.
    Call {
        /// Name at the call site, for diagnostics.
        name: Arc<str>,
        /// What to invoke.
        target: CallableTarget,
        /// Arguments.
        args: Vec<CompiledExpr>,
    },
    /// A built-in method on a value.
    Method {
        /// Receiver.
        receiver: Box<CompiledExpr>,
        /// Method.
        method: BuiltinMethod,
        /// Arguments.
        args: Vec<CompiledExpr>,
    },
    /// A list mutation on a global: read, rebuild, write back.
    GlobalMutate {
        /// Global name.
        global: Arc<str>,
        /// Mutation.
        mutator: ListMutator,
        /// Arguments.
        args: Vec<CompiledExpr>,
    },
    /// `new Type(args)`.
    New {
        /// Type to instantiate.
        def: Arc<TypeDef>,
        /// Field values in declaration order.
        args: Vec<CompiledExpr>,
    },
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<CompiledExpr>,
        /// Right operand.
        rhs: Box<CompiledExpr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<CompiledExpr>,
    },
}

impl CompiledExpr {
    /// Returns true if this expression or any sub-expression satisfies `pred`.
    pub fn any(&self, pred: &dyn Fn(&CompiledExpr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Self::Const(_)
            | Self::Local(_)
            | Self::Fact(_)
            | Self::FactField { .. }
            | Self::CurrentField(_)
            | Self::Global(_) => false,
            Self::Field { target, .. } => target.any(pred),
            Self::Call { args, .. } | Self::GlobalMutate { args, .. } | Self::New { args, .. } => {
                args.iter().any(|arg| arg.any(pred))
            }
            Self::Method { receiver, args, .. } => {
                receiver.any(pred) || args.iter().any(|arg| arg.any(pred))
            }
            Self::Binary { lhs, rhs, .. } => lhs.any(pred) || rhs.any(pred),
            Self::Unary { operand, .. } => operand.any(pred),
        }
    }

    /// Returns true if the expression reads facts bound by earlier patterns.
    ///
    /// Constraints that do are join tests; the rest only look at the fact
    /// under test and can be evaluated once per fact.
    #[must_use]
    pub fn references_tuple(&self) -> bool {
        self.any(&|e| matches!(e, Self::Fact(_) | Self::FactField { .. }))
    }

    /// Returns true if the expression calls a package-local function.
    #[must_use]
    pub fn calls_local(&self) -> bool {
        self.any(&|e| {
            matches!(
                e,
                Self::Call {
                    target: CallableTarget::Local(_),
                    ..
                }
            )
        })
    }

    /// Returns true if the expression reads the fact under test.
    #[must_use]
    pub fn references_current(&self) -> bool {
        self.any(&|e| matches!(e, Self::CurrentField(_)))
    }
}

/// One step of a compiled consequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompiledAction {
    /// Evaluate and discard.
    Eval(CompiledExpr),
    /// Store into a frame slot.
    Let {
        /// Slot.
        slot: usize,
        /// Value.
        value: CompiledExpr,
    },
    /// Insert a new fact.
    Insert(CompiledExpr),
    /// Update fields of a matched fact and re-propagate it.
    Modify {
        /// Tuple index of the fact.
        index: usize,
        /// Variable name, for diagnostics.
        var: Arc<str>,
        /// Field assignments; all are evaluated before any is applied.
        assignments: Vec<(Arc<str>, CompiledExpr)>,
    },
    /// Retract a matched fact.
    Retract {
        /// Tuple index of the fact.
        index: usize,
        /// Variable name, for diagnostics.
        var: Arc<str>,
    },
    /// Replace a global's value.
    SetGlobal {
        /// Global name.
        name: Arc<str>,
        /// New value.
        value: CompiledExpr,
    },
    /// Stop the firing loop after this consequence.
    Halt,
}

/// A compiled rule consequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Consequence {
    /// Actions in order.
    pub actions: Vec<CompiledAction>,
    /// Number of frame slots the actions use.
    pub frame_size: usize,
}

/// A compiled package-local function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFunction {
    /// Function name.
    pub name: Arc<str>,
    /// Signature.
    pub signature: Signature,
    /// Body; parameters occupy the first frame slots.
    pub body: CompiledExpr,
    /// Number of frame slots the body uses.
    pub frame_size: usize,
}

/// The compiled local functions of one package.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionTable {
    package: Arc<str>,
    functions: Vec<CompiledFunction>,
}

impl FunctionTable {
    /// Creates a table with no functions.
    #[must_use]
    pub fn empty(package: &str) -> Self {
        Self {
            package: Arc::from(package),
            functions: Vec::new(),
        }
    }

    /// Creates a table; indices match the order functions were declared in.
    #[must_use]
    pub fn new(package: &str, functions: Vec<CompiledFunction>) -> Self {
        Self {
            package: Arc::from(package),
            functions,
        }
    }

    /// Returns the owning package.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Returns a function by index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CompiledFunction> {
        self.functions.get(index)
    }

    /// Returns the number of functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
