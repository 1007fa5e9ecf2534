//! Session events and listeners.
//!
//! A session reports what it does (fact changes, activations appearing and
//! disappearing, firings) to the listeners attached to it. Events are only
//! built when at least one listener is attached.

use std::fmt;
use std::sync::Arc;

use brindle_foundation::FactHandle;

use crate::rule::{CompiledRule, RuleId};

/// Names a rule in an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleRef {
    /// Rule id.
    pub id: RuleId,
    /// Owning package.
    pub package: Arc<str>,
    /// Rule name.
    pub name: Arc<str>,
}

impl RuleRef {
    pub(crate) fn new(id: RuleId, rule: &CompiledRule) -> Self {
        Self {
            id,
            package: Arc::clone(&rule.package),
            name: Arc::clone(&rule.name),
        }
    }
}

impl fmt::Display for RuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.package, self.name)
    }
}

/// Something that happened in a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A fact was inserted.
    FactInserted {
        /// Its handle.
        handle: FactHandle,
        /// Its type.
        type_name: Arc<str>,
    },
    /// A fact was replaced.
    FactUpdated {
        /// Its handle.
        handle: FactHandle,
        /// Its type.
        type_name: Arc<str>,
    },
    /// A fact was retracted.
    FactRetracted {
        /// Its handle.
        handle: FactHandle,
        /// Its type.
        type_name: Arc<str>,
    },
    /// A rule matched and an activation was queued.
    ActivationCreated {
        /// The rule.
        rule: RuleRef,
        /// The matched facts.
        tuple: Vec<FactHandle>,
        /// Creation order.
        sequence: u64,
    },
    /// A queued activation stopped matching before it fired.
    ActivationCancelled {
        /// The rule.
        rule: RuleRef,
        /// The matched facts.
        tuple: Vec<FactHandle>,
    },
    /// A consequence is about to run.
    BeforeFire {
        /// The rule.
        rule: RuleRef,
        /// The matched facts.
        tuple: Vec<FactHandle>,
        /// Creation order of the activation.
        sequence: u64,
    },
    /// A consequence completed.
    AfterFire {
        /// The rule.
        rule: RuleRef,
        /// The matched facts.
        tuple: Vec<FactHandle>,
    },
    /// A consequence called `halt()`.
    Halted,
    /// The session was disposed.
    Disposed,
}

/// Receives session events.
pub trait SessionListener {
    /// Called once per event, in order.
    fn on_event(&mut self, event: &SessionEvent);
}

impl<F> SessionListener for F
where
    F: FnMut(&SessionEvent),
{
    fn on_event(&mut self, event: &SessionEvent) {
        self(event);
    }
}
