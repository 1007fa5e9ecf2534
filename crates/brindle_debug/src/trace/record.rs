//! Trace record types.

use brindle_engine::SessionEvent;

/// Returns a short, stable name for an event's type.
#[must_use]
pub fn event_type(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::FactInserted { .. } => "fact-inserted",
        SessionEvent::FactUpdated { .. } => "fact-updated",
        SessionEvent::FactRetracted { .. } => "fact-retracted",
        SessionEvent::ActivationCreated { .. } => "activation-created",
        SessionEvent::ActivationCancelled { .. } => "activation-cancelled",
        SessionEvent::BeforeFire { .. } => "before-fire",
        SessionEvent::AfterFire { .. } => "after-fire",
        SessionEvent::Halted => "halted",
        SessionEvent::Disposed => "disposed",
    }
}

/// A recorded session event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    /// Unique record ID within the tracer.
    pub id: u64,
    /// Number of firings the tracer had seen when this event arrived.
    ///
    /// A `before-fire` event carries the number of its own firing, so the
    /// events a consequence causes share it.
    pub firing: u64,
    /// Nanoseconds since the tracer was created.
    pub timestamp_ns: u64,
    /// The event.
    pub event: SessionEvent,
}

impl TraceRecord {
    /// Creates a new trace record.
    #[must_use]
    pub fn new(id: u64, firing: u64, timestamp_ns: u64, event: SessionEvent) -> Self {
        Self {
            id,
            firing,
            timestamp_ns,
            event,
        }
    }

    /// Returns the event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        event_type(&self.event)
    }

    /// Returns true for fact insert, update, and retract events.
    #[must_use]
    pub fn is_fact_event(&self) -> bool {
        matches!(
            self.event,
            SessionEvent::FactInserted { .. }
                | SessionEvent::FactUpdated { .. }
                | SessionEvent::FactRetracted { .. }
        )
    }

    /// Returns true for activation and firing events.
    #[must_use]
    pub fn is_rule_event(&self) -> bool {
        matches!(
            self.event,
            SessionEvent::ActivationCreated { .. }
                | SessionEvent::ActivationCancelled { .. }
                | SessionEvent::BeforeFire { .. }
                | SessionEvent::AfterFire { .. }
        )
    }
}
