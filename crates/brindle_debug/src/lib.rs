//! Session tracing for Brindle.
//!
//! This crate provides:
//! - [`Tracer`] - Records session events into a ring buffer
//! - [`SharedTracer`] - A tracer that can be attached to a session and read afterwards
//! - [`TraceBuffer`] - Bounded storage for trace records
//! - [`HumanFormatter`] - One line per record

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod trace;

pub use config::{TraceOutput, TracerConfig};
pub use trace::{
    HumanFormatter, SharedTracer, TraceBuffer, TraceBufferStats, TraceFormatter, TraceRecord,
    Tracer, event_type,
};
