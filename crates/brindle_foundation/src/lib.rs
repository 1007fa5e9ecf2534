//! Core values, facts, types, and errors for Brindle.
//!
//! This crate provides:
//! - [`Value`] - The runtime value type shared by facts, globals, and expressions
//! - [`Object`] - A typed record; every fact in working memory is an object
//! - [`FactHandle`] - Session-scoped fact identity
//! - [`Type`] - Static type descriptors used by the rule compiler
//! - [`Error`] - Rich runtime error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod error;
pub mod handle;
pub mod object;
pub mod types;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use error::{Error, ErrorContext, ErrorKind, Result, SemanticLimit};
pub use handle::FactHandle;
pub use object::Object;
pub use types::Type;
pub use value::Value;
