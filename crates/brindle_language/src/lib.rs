//! Rule language front end for Brindle.
//!
//! This crate provides:
//! - [`ast`] - The unresolved rule package AST a parser produces
//! - [`Catalog`] - The host-supplied universe of fact types
//! - [`SymbolTable`] - Per-package resolution of types, callables, and globals
//! - [`ExprCompiler`] - Compiling expressions and consequences to resolved IR
//! - [`Evaluator`] - Evaluating the resolved IR
//! - [`Diagnostics`] - Accumulated compile errors

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ast;
pub mod catalog;
pub mod compiler;
pub mod diagnostics;
pub mod eval;
pub mod expr;
pub mod methods;
pub mod span;
pub mod symbols;

pub use catalog::{Catalog, FieldDef, NativeFunction, QualifiedName, TypeDef};
pub use compiler::{ExprCompiler, Typed, compile_function};
pub use diagnostics::{CompileError, CompileErrorKind, Diagnostics, Severity};
pub use eval::{Evaluator, FactView, NoContext, RuntimeContext, Scope};
pub use expr::{CompiledAction, CompiledExpr, CompiledFunction, Consequence, FunctionTable};
pub use methods::{BuiltinMethod, ListMutator};
pub use span::Span;
pub use symbols::{
    BindingOrigin, CallableRef, CallableTarget, LocalFunction, Signature, SymbolTable, TypeRef,
};
