//! Brindle - forward-chaining rule engine
//!
//! This crate re-exports all layers of the Brindle system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 3: brindle_debug       — Session tracing and trace formatting
//! Layer 2: brindle_engine      — Rule compiler, matching network, sessions, snapshots
//! Layer 1: brindle_language    — Rule AST, catalog, symbol table, expressions
//! Layer 0: brindle_foundation  — Core types (Value, Object, FactHandle, Error)
//! ```

pub use brindle_debug as debug;
pub use brindle_engine as engine;
pub use brindle_foundation as foundation;
pub use brindle_language as language;
