//! The agenda: pending activations in firing order.
//!
//! Activations are ordered by salience (highest first), then by the sequence
//! number they were created with (oldest first). Every live match of a rule is
//! tracked exactly once, whether it is waiting, has fired, or was suppressed
//! by no-loop; a match only becomes pending again after it has been
//! withdrawn and matched anew.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use brindle_foundation::FactHandle;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::network::TerminalInfo;
use crate::network::memory::Token;
use crate::rule::RuleId;

/// A rule together with the facts that matched it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Activation {
    /// The rule.
    pub rule: RuleId,
    /// Matched facts, one per positive pattern, in pattern order.
    pub tuple: Token,
    /// The rule's salience.
    pub salience: i32,
    /// Creation order.
    pub sequence: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct AgendaKey {
    salience: Reverse<i32>,
    sequence: u64,
}

/// What became of a live match that is no longer pending.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settled {
    /// Its rule fired.
    Fired,
    /// A no-loop rule re-matched it while firing on it.
    Suppressed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MatchState {
    Pending(AgendaKey),
    Fired,
    Suppressed,
}

/// Pending activations and the state of every live match.
#[derive(Clone, Debug, Default)]
pub struct Agenda {
    queue: BTreeMap<AgendaKey, (RuleId, Token)>,
    states: BTreeMap<(RuleId, Token), MatchState>,
    next_sequence: u64,
    firing: Option<(RuleId, Token)>,
}

impl Agenda {
    /// Creates an empty agenda.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new match. Returns the sequence number of the created
    /// activation, or `None` if the match is already known or is suppressed
    /// because it is the match currently firing a no-loop rule.
    pub fn activate(&mut self, info: TerminalInfo, tuple: &[FactHandle]) -> Option<u64> {
        let key = (info.rule, tuple.to_vec());
        if self.states.contains_key(&key) {
            return None;
        }
        if info.no_loop && self.firing.as_ref() == Some(&key) {
            trace!(rule = %info.rule, "no-loop suppressed re-activation");
            self.states.insert(key, MatchState::Suppressed);
            return None;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.enqueue(key, info.salience, sequence);
        Some(sequence)
    }

    /// Forgets every match of `rule` whose tuple starts with `prefix`.
    ///
    /// Returns the activations that were still pending.
    pub fn deactivate(&mut self, rule: RuleId, prefix: &[FactHandle]) -> Vec<Activation> {
        let doomed: Vec<(RuleId, Token)> = self
            .states
            .range((rule, prefix.to_vec())..)
            .take_while(|((r, tuple), _)| *r == rule && tuple.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        let mut cancelled = Vec::new();
        for key in doomed {
            if let Some(MatchState::Pending(agenda_key)) = self.states.remove(&key) {
                self.queue.remove(&agenda_key);
                cancelled.push(Activation {
                    rule: key.0,
                    tuple: key.1,
                    salience: agenda_key.salience.0,
                    sequence: agenda_key.sequence,
                });
            }
        }
        cancelled
    }

    /// Takes the next activation and marks its match as firing.
    pub fn pop(&mut self) -> Option<Activation> {
        let (key, (rule, tuple)) = self.queue.pop_first()?;
        self.states.insert((rule, tuple.clone()), MatchState::Fired);
        self.firing = Some((rule, tuple.clone()));
        Some(Activation {
            rule,
            tuple,
            salience: key.salience.0,
            sequence: key.sequence,
        })
    }

    /// Returns the next activation without taking it.
    #[must_use]
    pub fn peek(&self) -> Option<Activation> {
        self.queue
            .first_key_value()
            .map(|(key, (rule, tuple))| Activation {
                rule: *rule,
                tuple: tuple.clone(),
                salience: key.salience.0,
                sequence: key.sequence,
            })
    }

    /// Ends the firing started by [`Agenda::pop`].
    pub fn finish_firing(&mut self) {
        self.firing = None;
    }

    /// Returns the pending activations in firing order.
    #[must_use]
    pub fn pending(&self) -> Vec<Activation> {
        self.queue
            .iter()
            .map(|(key, (rule, tuple))| Activation {
                rule: *rule,
                tuple: tuple.clone(),
                salience: key.salience.0,
                sequence: key.sequence,
            })
            .collect()
    }

    /// Returns the number of pending activations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the sequence number the next activation will get.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Iterates over every live match that is not pending, with whether it
    /// fired or was suppressed by no-loop.
    pub fn settled(&self) -> impl Iterator<Item = (RuleId, &Token, Settled)> {
        self.states.iter().filter_map(|((rule, tuple), state)| match state {
            MatchState::Pending(_) => None,
            MatchState::Fired => Some((*rule, tuple, Settled::Fired)),
            MatchState::Suppressed => Some((*rule, tuple, Settled::Suppressed)),
        })
    }

    /// Drops every match.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.states.clear();
        self.firing = None;
    }

    // -------------------------------------------------------------------------
    // Restoring
    // -------------------------------------------------------------------------

    /// Re-creates a pending activation with its original sequence number.
    /// Returns false if the match is already known.
    pub(crate) fn restore_pending(
        &mut self,
        rule: RuleId,
        tuple: Token,
        salience: i32,
        sequence: u64,
    ) -> bool {
        let key = (rule, tuple);
        if self.states.contains_key(&key) {
            return false;
        }
        self.enqueue(key, salience, sequence);
        self.next_sequence = self.next_sequence.max(sequence + 1);
        true
    }

    /// Records a live match that is not pending. Returns false if the match
    /// is already known.
    pub(crate) fn restore_settled(&mut self, rule: RuleId, tuple: Token, settled: Settled) -> bool {
        let key = (rule, tuple);
        if self.states.contains_key(&key) {
            return false;
        }
        let state = match settled {
            Settled::Fired => MatchState::Fired,
            Settled::Suppressed => MatchState::Suppressed,
        };
        self.states.insert(key, state);
        true
    }

    pub(crate) fn set_next_sequence(&mut self, next: u64) {
        self.next_sequence = self.next_sequence.max(next);
    }

    fn enqueue(&mut self, key: (RuleId, Token), salience: i32, sequence: u64) {
        let agenda_key = AgendaKey {
            salience: Reverse(salience),
            sequence,
        };
        self.queue.insert(agenda_key, key.clone());
        self.states.insert(key, MatchState::Pending(agenda_key));
    }
}
