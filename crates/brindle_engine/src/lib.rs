//! Rule compilation, matching network, agenda, and sessions for Brindle.
//!
//! This crate provides:
//! - [`RuleCompiler`] and [`compile_package`] - Resolving rule ASTs into compiled rules
//! - [`Network`] - The shared, reference-counted node graph built from rules
//! - [`KnowledgeBuilder`] / [`KnowledgeBase`] - Packages compiled into a network
//! - [`Session`] - Working memory, incremental matching, and the firing loop
//! - [`Agenda`] - Activation ordering by salience and creation order
//! - [`SessionSnapshot`] - Capturing and restoring session state

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agenda;
pub mod config;
pub mod event;
pub mod knowledge;
pub mod network;
pub mod package;
pub mod rule;
pub mod session;
pub mod snapshot;
pub mod working_memory;

pub use agenda::{Activation, Agenda, Settled};
pub use config::SessionConfig;
pub use event::{RuleRef, SessionEvent, SessionListener};
pub use knowledge::{KnowledgeBase, KnowledgeBuilder};
pub use network::{ActivationSink, MemoryRecord, Network, NetworkMemory, NodeId, NodeKind, TerminalInfo};
pub use package::{CompiledPackage, compile_package};
pub use rule::{CompiledCondition, CompiledPattern, CompiledRule, RuleCompiler, RuleId};
pub use session::{GlobalTypes, Session};
pub use snapshot::{ActivationRecord, FactRecord, MatchRecord, NodeRecord, SessionSnapshot};
pub use working_memory::WorkingMemory;
