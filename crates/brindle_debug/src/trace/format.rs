//! Trace output formatters.

use std::fmt::Write;

use brindle_engine::SessionEvent;
use brindle_foundation::FactHandle;

use super::record::TraceRecord;

/// Formats trace records.
pub trait TraceFormatter {
    /// Formats a single trace record to a string.
    fn format(&self, record: &TraceRecord) -> String;

    /// Formats multiple records, one per line.
    fn format_many(&self, records: &[&TraceRecord]) -> String {
        records
            .iter()
            .map(|r| self.format(r))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Formats trace records in human-readable form.
#[derive(Clone, Debug, Default)]
pub struct HumanFormatter {
    /// Whether to include timestamps.
    pub show_timestamps: bool,
    /// Whether to include record IDs.
    pub show_ids: bool,
}

impl HumanFormatter {
    /// Creates a new human formatter with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to show timestamps.
    #[must_use]
    pub fn with_timestamps(mut self) -> Self {
        self.show_timestamps = true;
        self
    }

    /// Builder method to show record IDs.
    #[must_use]
    pub fn with_ids(mut self) -> Self {
        self.show_ids = true;
        self
    }

    #[allow(clippy::cast_precision_loss)]
    fn format_timestamp(ns: u64) -> String {
        let us = ns / 1000;
        if us >= 1_000_000 {
            format!("{:.3}s", us as f64 / 1_000_000.0)
        } else if us >= 1000 {
            format!("{:.3}ms", us as f64 / 1000.0)
        } else {
            format!("{us}us")
        }
    }

    fn tuple(tuple: &[FactHandle]) -> String {
        let handles: Vec<_> = tuple.iter().map(ToString::to_string).collect();
        format!("[{}]", handles.join(", "))
    }
}

impl TraceFormatter for HumanFormatter {
    fn format(&self, record: &TraceRecord) -> String {
        let mut prefix = String::new();
        if self.show_ids {
            let _ = write!(prefix, "[{:06}] ", record.id);
        }
        let _ = write!(prefix, "F{:04} ", record.firing);
        if self.show_timestamps {
            let _ = write!(
                prefix,
                "{:>10} ",
                Self::format_timestamp(record.timestamp_ns)
            );
        }

        let event = match &record.event {
            SessionEvent::FactInserted { handle, type_name } => {
                format!("    INSERT {handle} {type_name}")
            }
            SessionEvent::FactUpdated { handle, type_name } => {
                format!("    UPDATE {handle} {type_name}")
            }
            SessionEvent::FactRetracted { handle, type_name } => {
                format!("    RETRACT {handle} {type_name}")
            }
            SessionEvent::ActivationCreated {
                rule,
                tuple,
                sequence,
            } => format!("  ACTIVATED {rule} {} #{sequence}", Self::tuple(tuple)),
            SessionEvent::ActivationCancelled { rule, tuple } => {
                format!("  CANCELLED {rule} {}", Self::tuple(tuple))
            }
            SessionEvent::BeforeFire {
                rule,
                tuple,
                sequence,
            } => format!("  FIRING {rule} {} #{sequence}", Self::tuple(tuple)),
            SessionEvent::AfterFire { rule, tuple } => {
                format!("  COMPLETE {rule} {}", Self::tuple(tuple))
            }
            SessionEvent::Halted => "=== HALTED ===".to_string(),
            SessionEvent::Disposed => "=== DISPOSED ===".to_string(),
        };

        format!("{prefix}{event}")
    }
}
