//! Integration tests for Layer 1: Language
//!
//! Names are resolved through a package symbol table, compiled, and then
//! evaluated, without a session.

mod evaluation;
mod resolution;
